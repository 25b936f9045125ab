//! Asynchronous Query Registry
//!
//! Tracks long-running queries from submission to expiry. Callers submit SQL
//! and get an identifier back immediately; a background driver task runs the
//! query and records the outcome; callers poll snapshots until the query
//! reaches a terminal state.
//!
//! ## Architecture
//!
//! ```text
//! QueryRegistry
//! ├── Store (RwLock, short critical sections only)
//! │   ├── records: HashMap<QueryId, QueryRecord>
//! │   ├── next_seq (submission order for listing)
//! │   ├── closed flag
//! │   └── detached driver tasks of pruned records
//! ├── Shutdown gate (async Mutex over driver handles still being joined)
//! ├── Executor (Arc<dyn QueryExecutor>)
//! └── RegistryConfig (defaults, limits, TTL)
//!
//! ExecutionDriver (one tokio task per query)
//!   executor.execute() ──► RowBuffer ──► store.write() ──► record.finish()
//! ```
//!
//! ## Lifecycle
//!
//! 1. `execute_query()` → QueryId, record RUNNING, driver spawned
//! 2. `get_snapshot()` / `list_queries()` / `get_rows()` → owned copies
//! 3. `cancel_query()` → RUNNING becomes CANCELLED, driver stops
//! 4. `prune_expired()` → records past their TTL are removed
//! 5. `close()` → every driver stopped and awaited, store cleared
//!
//! TTL is fixed at submission (`created_at + default_ttl`) and is not
//! extended when a query completes.

mod driver;
mod error;
mod pruner;
mod record;
mod snapshot;

pub use error::{RegistryError, RegistryResult};
pub use pruner::Pruner;
pub use record::{QueryId, QueryOptions, QueryStatus, ResolvedOptions, RowBuffer};
pub use snapshot::{QueryFailure, QuerySnapshot, RegistryStats, ResultPage};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use tokio::task::JoinHandle;

use crate::config::RegistryConfig;
use crate::execution::ExecutionError;
use crate::executor::QueryExecutor;
use driver::ExecutionDriver;
use record::QueryRecord;

pub(crate) type SharedStore = Arc<RwLock<Store>>;

/// The single source of truth for query state
#[derive(Default)]
pub(crate) struct Store {
    pub records: HashMap<QueryId, QueryRecord>,
    next_seq: u64,
    closed: bool,
    /// Driver tasks whose records were pruned while still running
    detached: Vec<JoinHandle<()>>,
}

/// Registry of asynchronously executing queries
///
/// Thread-safe via an internal lock that is only held while copying or
/// assigning record fields, never across a call into the executor.
/// Share it between tasks with `Arc`.
pub struct QueryRegistry {
    store: SharedStore,
    /// Driver handles taken by `close`, popped only once joined
    shutdown: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    executor: Arc<dyn QueryExecutor>,
    config: RegistryConfig,
    default_ttl: TimeDelta,
}

impl QueryRegistry {
    /// Create a registry that runs queries on `executor`
    pub fn new(config: RegistryConfig, executor: Arc<dyn QueryExecutor>) -> RegistryResult<Self> {
        config.validate().map_err(RegistryError::InvalidConfig)?;
        let default_ttl = i64::try_from(config.default_ttl_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .ok_or_else(|| {
                RegistryError::InvalidConfig(format!(
                    "default_ttl_secs out of range: {}",
                    config.default_ttl_secs
                ))
            })?;

        Ok(Self {
            store: Arc::new(RwLock::new(Store::default())),
            shutdown: tokio::sync::Mutex::new(Vec::new()),
            executor,
            config,
            default_ttl,
        })
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Submit a query for background execution.
    ///
    /// Returns as soon as the record is visible in the store; the query
    /// itself runs on a spawned task. Must be called from within a Tokio
    /// runtime. Only option validation and registry-level limits can fail
    /// here; execution failures are recorded on the query.
    pub fn execute_query(&self, sql: &str, options: QueryOptions) -> RegistryResult<QueryId> {
        if sql.trim().is_empty() {
            return Err(RegistryError::EmptySql);
        }
        let options = options.resolve(&self.config)?;
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;

        let query_id = uuid::Uuid::new_v4().to_string();
        let created_at = Utc::now();
        let ttl_expires_at = created_at
            .checked_add_signed(self.default_ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        {
            let mut store = self.store.write();
            if store.closed {
                return Err(RegistryError::Closed);
            }
            if self.config.max_queries > 0 && store.records.len() >= self.config.max_queries {
                return Err(RegistryError::CapacityExceeded {
                    limit: self.config.max_queries,
                });
            }

            let seq = store.next_seq;
            store.next_seq += 1;

            let mut record = QueryRecord::new(
                query_id.clone(),
                seq,
                sql.to_string(),
                options,
                created_at,
                ttl_expires_at,
            );
            let driver = ExecutionDriver {
                store: Arc::clone(&self.store),
                executor: Arc::clone(&self.executor),
                query_id: query_id.clone(),
                sql: sql.to_string(),
                query_timeout: options.query_timeout,
                max_inline_rows: options.max_inline_rows,
                cancel: record.cancel_handle.clone(),
            };
            // The driver's first store access waits for this guard to drop.
            record.task = Some(runtime.spawn(driver.run()));
            store.records.insert(query_id.clone(), record);
        }

        tracing::info!(
            query_id = %query_id,
            timeout_ms = options.query_timeout.as_millis() as u64,
            max_inline_rows = options.max_inline_rows,
            "query_submitted"
        );
        Ok(query_id)
    }

    /// Current state of a query, or `None` if it is unknown, pruned or closed
    pub fn get_snapshot(&self, query_id: &str) -> Option<QuerySnapshot> {
        self.store
            .read()
            .records
            .get(query_id)
            .map(QuerySnapshot::from_record)
    }

    /// Snapshots of all tracked queries in submission order, optionally
    /// restricted to one status
    pub fn list_queries(&self, status: Option<QueryStatus>) -> Vec<QuerySnapshot> {
        let store = self.store.read();
        let mut records: Vec<&QueryRecord> = store
            .records
            .values()
            .filter(|record| status.is_none_or(|s| record.status == s))
            .collect();
        records.sort_unstable_by_key(|record| record.seq);
        records.into_iter().map(QuerySnapshot::from_record).collect()
    }

    /// Copy of up to `limit` buffered rows starting at `offset`.
    ///
    /// Rows are only buffered once a query has COMPLETED; for any other
    /// status the page is empty.
    pub fn get_rows(&self, query_id: &str, offset: usize, limit: usize) -> Option<ResultPage> {
        self.store
            .read()
            .records
            .get(query_id)
            .map(|record| ResultPage::from_record(record, offset, limit))
    }

    /// The error a FAILED query ended with
    pub fn get_error(&self, query_id: &str) -> Option<ExecutionError> {
        self.store
            .read()
            .records
            .get(query_id)
            .and_then(|record| record.error.clone())
    }

    /// Cancel a running query.
    ///
    /// The record turns CANCELLED immediately and its driver stops at its
    /// next await point. Returns `false` if the query is unknown or has
    /// already finished.
    pub fn cancel_query(&self, query_id: &str) -> bool {
        let cancelled = self
            .store
            .write()
            .records
            .get_mut(query_id)
            .is_some_and(|record| record.request_cancel(Utc::now()));
        if cancelled {
            tracing::info!(query_id, "query_cancelled");
        }
        cancelled
    }

    /// Administrative: make a query eligible for pruning now.
    ///
    /// Only ever moves `ttl_expires_at` earlier. Returns `false` if the
    /// query is unknown.
    pub fn expire_query(&self, query_id: &str) -> bool {
        let now = Utc::now();
        let mut store = self.store.write();
        let Some(record) = store.records.get_mut(query_id) else {
            return false;
        };
        record.ttl_expires_at = record.ttl_expires_at.min(now);
        true
    }

    /// Remove every query whose TTL has elapsed.
    ///
    /// Running queries among them are cancelled before removal. Returns the
    /// number of records removed.
    pub fn prune_expired(&self) -> usize {
        let now = Utc::now();
        let mut store = self.store.write();
        let expired: Vec<QueryId> = store
            .records
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.query_id.clone())
            .collect();

        let mut cancelled = 0usize;
        for query_id in &expired {
            let Some(mut record) = store.records.remove(query_id) else {
                continue;
            };
            if record.request_cancel(now) {
                cancelled += 1;
            }
            if let Some(task) = record.task.take() {
                if !task.is_finished() {
                    store.detached.push(task);
                }
            }
        }
        store.detached.retain(|task| !task.is_finished());
        drop(store);

        let pruned = expired.len();
        if pruned > 0 {
            tracing::info!(pruned, cancelled, "queries_pruned");
        }
        pruned
    }

    /// Stop every driver, wait for them to exit, then clear the store.
    ///
    /// Idempotent. New submissions are rejected from the moment this is
    /// called. Concurrent callers all return only after every driver has
    /// stopped; a caller dropped mid-join leaves the remaining handles for
    /// the next one.
    pub async fn close(&self) {
        let mut pending = self.shutdown.lock().await;
        let was_open = {
            let mut store = self.store.write();
            let was_open = !store.closed;
            store.closed = true;

            let now = Utc::now();
            pending.extend(store.detached.drain(..));
            for record in store.records.values_mut() {
                record.request_cancel(now);
                pending.extend(record.task.take());
            }
            was_open
        };

        let awaited = pending.len();
        while let Some(task) = pending.last_mut() {
            let result = task.await;
            pending.pop();
            if let Err(err) = result {
                if err.is_panic() {
                    tracing::warn!(error = %err, "query_driver_panicked");
                }
            }
        }

        let removed = {
            let mut store = self.store.write();
            let removed = store.records.len();
            store.records.clear();
            removed
        };

        if was_open {
            tracing::info!(removed, awaited, "registry_closed");
        } else {
            tracing::debug!(removed, awaited, "registry_close_repeated");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.store.read().closed
    }

    /// Number of tracked queries
    pub fn len(&self) -> usize {
        self.store.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Per-status counts of tracked queries
    pub fn stats(&self) -> RegistryStats {
        let store = self.store.read();
        let mut stats = RegistryStats::default();
        for record in store.records.values() {
            stats.count(record.status);
        }
        stats
    }
}
