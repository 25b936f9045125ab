//! Caller-visible projections of query records
//!
//! Everything here is an owned copy taken under the store lock. Nothing
//! references the live record, so later state changes never show up in a
//! value that has already been handed out.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::record::{QueryId, QueryRecord, QueryStatus};
use crate::execution::FailureKind;
use crate::executor::Row;

/// Failure description carried by a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl std::fmt::Display for QueryFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Point-in-time view of one query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuerySnapshot {
    pub query_id: QueryId,
    pub sql: String,
    pub status: QueryStatus,
    pub row_count: usize,
    pub truncated: bool,
    pub error: Option<QueryFailure>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub ttl_expires_at: DateTime<Utc>,
    /// Advisory re-poll interval in seconds
    pub poll_interval_secs: f64,
}

impl QuerySnapshot {
    pub(crate) fn from_record(record: &QueryRecord) -> Self {
        QuerySnapshot {
            query_id: record.query_id.clone(),
            sql: record.sql.clone(),
            status: record.status,
            row_count: record.rows.len(),
            truncated: record.truncated,
            error: record.error.as_ref().map(|err| QueryFailure {
                kind: err.kind(),
                message: err.to_string(),
            }),
            created_at: record.created_at,
            completed_at: record.completed_at,
            ttl_expires_at: record.ttl_expires_at,
            poll_interval_secs: record.options.poll_interval.as_secs_f64(),
        }
    }
}

/// A window of buffered result rows
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPage {
    pub query_id: QueryId,
    pub status: QueryStatus,
    pub offset: usize,
    pub rows: Vec<Row>,
    /// Rows held in the buffer, regardless of the window
    pub row_count: usize,
    pub truncated: bool,
}

impl ResultPage {
    pub(crate) fn from_record(record: &QueryRecord, offset: usize, limit: usize) -> Self {
        let rows = record
            .rows
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        ResultPage {
            query_id: record.query_id.clone(),
            status: record.status,
            offset,
            rows,
            row_count: record.rows.len(),
            truncated: record.truncated,
        }
    }

    /// Whether rows exist past this window
    pub fn has_more(&self) -> bool {
        self.offset + self.rows.len() < self.row_count
    }
}

/// Summary statistics about tracked queries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryStats {
    pub total_queries: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

impl RegistryStats {
    pub(crate) fn count(&mut self, status: QueryStatus) {
        self.total_queries += 1;
        match status {
            QueryStatus::Running => self.running += 1,
            QueryStatus::Completed => self.completed += 1,
            QueryStatus::Failed => self.failed += 1,
            QueryStatus::Cancelled => self.cancelled += 1,
        }
    }
}
