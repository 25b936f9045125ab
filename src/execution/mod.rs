//! Query Execution Module
//!
//! Error taxonomy for a single query run plus the cancellation primitive
//! shared between the registry and its execution drivers.

mod timeout;

pub use timeout::{CancelHandle, TimeoutError};

use serde::{Deserialize, Serialize};

use crate::executor::ExecutorError;

/// Classification of a query failure, preserved in snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The query did not finish within its timeout
    Timeout,
    /// Malformed SQL, unknown table, bad parameter
    Programming,
    /// Connection loss, throttling, remote service failure
    Operational,
    /// Bad value or conversion failure in the data itself
    Data,
    /// Constraint violation reported by the data store
    Integrity,
    /// Feature not supported by the data store
    NotSupported,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Programming => write!(f, "programming"),
            FailureKind::Operational => write!(f, "operational"),
            FailureKind::Data => write!(f, "data"),
            FailureKind::Integrity => write!(f, "integrity"),
            FailureKind::NotSupported => write!(f, "not_supported"),
        }
    }
}

/// Execution error types
///
/// Captured on the query record when a run fails; never returned to the
/// caller that submitted the query.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ExecutionError {
    /// Query timed out
    #[error("Query timeout: {0}")]
    Timeout(#[from] TimeoutError),

    /// The executor reported an error
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),
}

impl ExecutionError {
    /// The failure kind recorded in snapshots
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutionError::Timeout(_) => FailureKind::Timeout,
            ExecutionError::Executor(err) => err.kind(),
        }
    }
}
