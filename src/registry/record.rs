//! Query options, status and the per-query record
//!
//! ## Record Lifecycle
//!
//! ```text
//! execute_query ──► RUNNING ──┬──► COMPLETED
//!                             ├──► FAILED
//!                             └──► CANCELLED
//! ```
//!
//! Terminal states are absorbing: `finish` and `request_cancel` only act on
//! a RUNNING record. Removal from the store is separate and happens only
//! through pruning or close.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::error::{RegistryError, RegistryResult};
use crate::config::{is_positive_secs, RegistryConfig};
use crate::execution::{CancelHandle, ExecutionError};
use crate::executor::Row;

/// Unique query identifier (random UUID, never reused)
pub type QueryId = String;

/// Lifecycle state of a submitted query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl QueryStatus {
    /// Every state except RUNNING is final
    pub fn is_terminal(self) -> bool {
        !matches!(self, QueryStatus::Running)
    }
}

impl std::fmt::Display for QueryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryStatus::Running => write!(f, "RUNNING"),
            QueryStatus::Completed => write!(f, "COMPLETED"),
            QueryStatus::Failed => write!(f, "FAILED"),
            QueryStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Caller-supplied per-query options; unset fields take registry defaults
///
/// Durations are fractional seconds so the struct maps directly onto a
/// request body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryOptions {
    /// Bound on the executor call, in seconds
    #[serde(default)]
    pub query_timeout: Option<f64>,
    /// Rows kept in memory before the result is marked truncated
    #[serde(default)]
    pub max_inline_rows: Option<usize>,
    /// How often the caller should re-poll, in seconds (advisory only)
    #[serde(default)]
    pub poll_interval: Option<f64>,
}

impl QueryOptions {
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = Some(timeout.as_secs_f64());
        self
    }

    pub fn with_max_inline_rows(mut self, rows: usize) -> Self {
        self.max_inline_rows = Some(rows);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval.as_secs_f64());
        self
    }

    /// Apply defaults from `config` and validate the result
    pub fn resolve(&self, config: &RegistryConfig) -> RegistryResult<ResolvedOptions> {
        let timeout_secs = self.query_timeout.unwrap_or(config.query_timeout_secs);
        if !is_positive_secs(timeout_secs) || timeout_secs > config.max_query_timeout_secs {
            return Err(RegistryError::InvalidOptions(format!(
                "query_timeout must be in (0, {}] seconds, got {timeout_secs}",
                config.max_query_timeout_secs
            )));
        }

        let max_inline_rows = self.max_inline_rows.unwrap_or(config.max_inline_rows);
        if max_inline_rows == 0 || max_inline_rows > config.max_inline_rows_limit {
            return Err(RegistryError::InvalidOptions(format!(
                "max_inline_rows must be in 1..={}, got {max_inline_rows}",
                config.max_inline_rows_limit
            )));
        }

        let poll_secs = self.poll_interval.unwrap_or(config.poll_interval_secs);
        if !is_positive_secs(poll_secs) {
            return Err(RegistryError::InvalidOptions(format!(
                "poll_interval must be a positive number of seconds, got {poll_secs}"
            )));
        }

        Ok(ResolvedOptions {
            query_timeout: to_duration("query_timeout", timeout_secs)?,
            max_inline_rows,
            poll_interval: to_duration("poll_interval", poll_secs)?,
        })
    }
}

fn to_duration(field: &str, secs: f64) -> RegistryResult<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|e| RegistryError::InvalidOptions(format!("{field}: {e}")))
}

/// Options with every default applied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedOptions {
    pub query_timeout: Duration,
    pub max_inline_rows: usize,
    pub poll_interval: Duration,
}

/// Result buffer capped at a fixed number of rows
///
/// Rows past the cap are not stored; the first one seen flips `truncated`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowBuffer {
    rows: Vec<Row>,
    cap: usize,
    truncated: bool,
}

impl RowBuffer {
    pub fn new(cap: usize) -> Self {
        RowBuffer {
            rows: Vec::with_capacity(cap.min(1024)),
            cap,
            truncated: false,
        }
    }

    /// Offer a row to the buffer.
    ///
    /// Returns `false` once the cap has been exceeded; callers should stop
    /// pulling rows at that point.
    pub fn push(&mut self, row: Row) -> bool {
        if self.truncated {
            return false;
        }
        if self.rows.len() < self.cap {
            self.rows.push(row);
            true
        } else {
            self.truncated = true;
            false
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_parts(self) -> (Vec<Row>, bool) {
        (self.rows, self.truncated)
    }
}

/// How an execution driver run ended
#[derive(Debug)]
pub(crate) enum Outcome {
    Completed(RowBuffer),
    Failed(ExecutionError),
    Cancelled,
}

/// Mutable state of one submitted query, owned by the registry store
#[derive(Debug)]
pub(crate) struct QueryRecord {
    pub query_id: QueryId,
    /// Submission order, used for stable listing
    pub seq: u64,
    pub sql: String,
    pub options: ResolvedOptions,
    pub status: QueryStatus,
    pub created_at: DateTime<Utc>,
    pub ttl_expires_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub rows: Vec<Row>,
    pub truncated: bool,
    pub error: Option<ExecutionError>,
    pub cancel_handle: CancelHandle,
    pub task: Option<JoinHandle<()>>,
}

impl QueryRecord {
    pub fn new(
        query_id: QueryId,
        seq: u64,
        sql: String,
        options: ResolvedOptions,
        created_at: DateTime<Utc>,
        ttl_expires_at: DateTime<Utc>,
    ) -> Self {
        QueryRecord {
            query_id,
            seq,
            sql,
            options,
            status: QueryStatus::Running,
            created_at,
            ttl_expires_at,
            completed_at: None,
            rows: Vec::new(),
            truncated: false,
            error: None,
            cancel_handle: CancelHandle::new(),
            task: None,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.ttl_expires_at <= now
    }

    /// Apply a driver outcome. Returns `false` if the record had already
    /// reached a terminal state, in which case nothing changes.
    pub fn finish(&mut self, outcome: Outcome, now: DateTime<Utc>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match outcome {
            Outcome::Completed(buffer) => {
                let (rows, truncated) = buffer.into_parts();
                self.rows = rows;
                self.truncated = truncated;
                self.status = QueryStatus::Completed;
            }
            Outcome::Failed(error) => {
                self.error = Some(error);
                self.status = QueryStatus::Failed;
            }
            Outcome::Cancelled => self.status = QueryStatus::Cancelled,
        }
        self.completed_at = Some(now);
        true
    }

    /// Mark a RUNNING record CANCELLED and signal its driver.
    ///
    /// Returns whether the status changed.
    pub fn request_cancel(&mut self, now: DateTime<Utc>) -> bool {
        let changed = self.finish(Outcome::Cancelled, now);
        self.cancel_handle.cancel();
        changed
    }
}
