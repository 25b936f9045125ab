//! Registry Error Types
//!
//! Only synchronous, pre-execution problems are errors. Failures of a
//! running query live on its record and are read back through snapshots.

use thiserror::Error;

/// Query registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Caller-supplied query options are malformed or out of range
    #[error("Invalid query options: {0}")]
    InvalidOptions(String),

    /// Submitted SQL text is empty
    #[error("Query text cannot be empty")]
    EmptySql,

    /// Registry configuration is inconsistent
    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),

    /// The registry already tracks its maximum number of queries
    #[error("Maximum number of tracked queries ({limit}) exceeded")]
    CapacityExceeded { limit: usize },

    /// The registry has been closed
    #[error("Query registry is closed")]
    Closed,

    /// Queries can only be submitted from inside a Tokio runtime
    #[error("No Tokio runtime available to run the query")]
    NoRuntime,
}

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;
