//! # Query Registry
//!
//! Bookkeeping for long-running queries: submit SQL, get an identifier back
//! at once, and poll for status while the query runs in the background.
//!
//! ## Architecture
//!
//! ```text
//! caller ──execute_query──► QueryRegistry ──spawn──► ExecutionDriver
//!    ▲                         │  (store)                 │
//!    │                         │                          ▼
//!    └──get_snapshot/list──────┘◄──── finish() ──── QueryExecutor
//!
//! Pruner ──prune_expired (periodic)──► QueryRegistry
//! close() ── cancel + await every driver, clear store
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use query_registry::{Config, QueryOptions, QueryRegistry, QueryStatus};
//!
//! let config = Config::load()?;
//! let registry = Arc::new(QueryRegistry::new(config.registry, executor)?);
//!
//! let id = registry.execute_query("SELECT * FROM events", QueryOptions::default())?;
//! loop {
//!     let snapshot = registry.get_snapshot(&id).expect("pruned");
//!     if snapshot.status.is_terminal() {
//!         break;
//!     }
//!     tokio::time::sleep(std::time::Duration::from_secs_f64(snapshot.poll_interval_secs)).await;
//! }
//! let page = registry.get_rows(&id, 0, 100);
//!
//! registry.close().await;
//! ```
//!
//! ## Module Organization
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `config` | Layered configuration (TOML + env) |
//! | `execution` | Failure taxonomy, timeout and cancellation |
//! | `executor` | Executor capability and the scripted in-memory executor |
//! | `registry` | Store, execution driver, snapshots, pruning, shutdown |

pub mod config;
pub mod execution;
pub mod executor;
pub mod registry;

pub use config::{Config, LoggingConfig, RegistryConfig};
pub use execution::{CancelHandle, ExecutionError, FailureKind, TimeoutError};
pub use executor::{ExecutorError, QueryExecutor, Row, RowStream, Script, ScriptedExecutor};
pub use registry::{
    Pruner, QueryFailure, QueryId, QueryOptions, QueryRegistry, QuerySnapshot, QueryStatus,
    RegistryError, RegistryResult, RegistryStats, ResolvedOptions, ResultPage, RowBuffer,
};
