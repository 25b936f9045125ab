//! Execution Driver
//!
//! One driver task runs per submitted query. It pulls rows from the
//! executor into a local [`RowBuffer`], racing the executor against the
//! query timeout and the record's cancel handle, and then publishes the
//! outcome to the store in a single short critical section.
//!
//! The store lock is never held while the executor is being awaited.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::StreamExt;

use super::record::{Outcome, QueryId, RowBuffer};
use super::SharedStore;
use crate::execution::{CancelHandle, ExecutionError, TimeoutError};
use crate::executor::{ExecutorError, QueryExecutor, RowStream};

pub(crate) struct ExecutionDriver {
    pub store: SharedStore,
    pub executor: Arc<dyn QueryExecutor>,
    pub query_id: QueryId,
    pub sql: String,
    pub query_timeout: Duration,
    pub max_inline_rows: usize,
    pub cancel: CancelHandle,
}

impl ExecutionDriver {
    pub async fn run(self) {
        let started = Instant::now();
        // select! builds every branch future before polling any of them
        if self.cancel.is_cancelled() {
            self.publish(Outcome::Cancelled, started.elapsed());
            return;
        }
        let outcome = tokio::select! {
            biased;
            () = self.cancel.cancelled() => Outcome::Cancelled,
            result = tokio::time::timeout(
                self.query_timeout,
                collect_rows(
                    self.executor.execute(&self.sql, self.query_timeout),
                    self.max_inline_rows,
                ),
            ) => match result {
                Ok(Ok(buffer)) => Outcome::Completed(buffer),
                Ok(Err(err)) => Outcome::Failed(ExecutionError::Executor(err)),
                Err(_elapsed) => Outcome::Failed(ExecutionError::Timeout(TimeoutError {
                    timeout: self.query_timeout,
                    elapsed: started.elapsed(),
                })),
            },
        };

        self.publish(outcome, started.elapsed());
    }

    fn publish(&self, outcome: Outcome, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        let query_id = self.query_id.as_str();
        let summary = match &outcome {
            Outcome::Completed(buffer) => {
                Summary::Completed(buffer.len(), buffer.is_truncated())
            }
            Outcome::Failed(err) => Summary::Failed(err.to_string()),
            Outcome::Cancelled => Summary::Cancelled,
        };

        let applied = self
            .store
            .write()
            .records
            .get_mut(&self.query_id)
            .map(|record| record.finish(outcome, Utc::now()));

        let Some(applied) = applied else {
            tracing::debug!(query_id, elapsed_ms, "query_outcome_dropped_record_gone");
            return;
        };
        if !applied {
            tracing::debug!(query_id, elapsed_ms, "query_outcome_ignored_already_terminal");
            return;
        }
        match summary {
            Summary::Completed(rows, truncated) => {
                tracing::info!(query_id, rows, truncated, elapsed_ms, "query_completed");
            }
            Summary::Failed(error) => {
                tracing::warn!(query_id, %error, elapsed_ms, "query_failed");
            }
            Summary::Cancelled => tracing::info!(query_id, elapsed_ms, "query_cancelled"),
        }
    }
}

enum Summary {
    Completed(usize, bool),
    Failed(String),
    Cancelled,
}

/// Pull rows into a buffer of at most `cap` rows.
///
/// Stops at the first row past the cap (marking the buffer truncated) so
/// the executor is never asked for more than `cap + 1` rows.
pub(crate) async fn collect_rows(
    mut stream: RowStream,
    cap: usize,
) -> Result<RowBuffer, ExecutorError> {
    let mut buffer = RowBuffer::new(cap);
    while let Some(row) = stream.next().await {
        if !buffer.push(row?) {
            break;
        }
    }
    Ok(buffer)
}
