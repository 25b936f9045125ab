//! Query Executor Capability
//!
//! The registry never talks to a data store directly. It is handed an
//! implementation of [`QueryExecutor`] at construction and drives it from
//! one background task per submitted query.
//!
//! An executor returns a lazy [`RowStream`]. Failures that happen before
//! the first row (bad SQL, connection refused) are simply the first item of
//! the stream; failures part-way through are yielded after the rows that
//! preceded them. The registry stops polling the stream as soon as it has
//! what it needs, so implementations should do their work on demand.

mod scripted;

pub use scripted::{numbered_rows, row, Script, ScriptedExecutor};

use std::time::Duration;

use futures_util::stream::BoxStream;

use crate::execution::FailureKind;

/// One result row: column name → JSON value
pub type Row = serde_json::Map<String, serde_json::Value>;

/// Lazy, finite sequence of rows produced by an executor
pub type RowStream = BoxStream<'static, Result<Row, ExecutorError>>;

/// Errors an executor can report
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    /// The executor enforced its own deadline
    #[error("Executor timed out after {0:?}")]
    Timeout(Duration),

    /// Malformed SQL, unknown objects, bad parameters
    #[error("Programming error: {0}")]
    Programming(String),

    /// Connection or service-level failure
    #[error("Operational error: {0}")]
    Operational(String),

    /// Problem with the data being processed
    #[error("Data error: {0}")]
    Data(String),

    /// Constraint violation
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Unsupported feature
    #[error("Not supported: {0}")]
    NotSupported(String),
}

impl ExecutorError {
    /// Failure classification for this error
    pub fn kind(&self) -> FailureKind {
        match self {
            ExecutorError::Timeout(_) => FailureKind::Timeout,
            ExecutorError::Programming(_) => FailureKind::Programming,
            ExecutorError::Operational(_) => FailureKind::Operational,
            ExecutorError::Data(_) => FailureKind::Data,
            ExecutorError::Integrity(_) => FailureKind::Integrity,
            ExecutorError::NotSupported(_) => FailureKind::NotSupported,
        }
    }
}

/// Capability that runs SQL against a remote data store
///
/// `timeout` is the bound the registry will enforce on the whole call; it is
/// passed through so executors can forward it to the remote side.
pub trait QueryExecutor: Send + Sync + 'static {
    /// Start executing `sql`, returning a stream of result rows
    fn execute(&self, sql: &str, timeout: Duration) -> RowStream;
}
