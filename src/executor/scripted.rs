//! In-memory executor that plays back scripted results
//!
//! Used by the workload runner and the test suite. Each SQL text maps to a
//! [`Script`]: rows to yield, optional delays, optional failure. Counters
//! expose how much work the registry actually requested, which lets tests
//! check truncation and shutdown behaviour from the outside.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt};
use parking_lot::RwLock;
use serde_json::Value;

use super::{ExecutorError, QueryExecutor, Row, RowStream};

/// Build a row from `(column, value)` pairs
pub fn row<'a>(columns: impl IntoIterator<Item = (&'a str, Value)>) -> Row {
    columns
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// `n` rows of the form `{"n": i}` for `i` in `0..n`
pub fn numbered_rows(n: usize) -> Vec<Row> {
    (0..n).map(|i| row([("n", Value::from(i))])).collect()
}

/// Scripted result for one SQL text
#[derive(Debug, Clone, Default)]
pub struct Script {
    rows: Vec<Row>,
    failure: Option<ExecutorError>,
    delay: Duration,
    row_delay: Duration,
}

impl Script {
    /// Yield `rows` and finish
    pub fn rows(rows: Vec<Row>) -> Self {
        Script {
            rows,
            ..Default::default()
        }
    }

    /// Fail before producing any row
    pub fn failing(error: ExecutorError) -> Self {
        Script {
            failure: Some(error),
            ..Default::default()
        }
    }

    /// Fail after the scripted rows have been yielded
    pub fn then_fail(mut self, error: ExecutorError) -> Self {
        self.failure = Some(error);
        self
    }

    /// Wait before the first item
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Wait before every item after the first
    pub fn with_row_delay(mut self, delay: Duration) -> Self {
        self.row_delay = delay;
        self
    }
}

/// Executor backed by a table of scripts
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: RwLock<HashMap<String, Script>>,
    fallback: RwLock<Option<Script>>,
    executions: AtomicUsize,
    rows_pulled: Arc<AtomicUsize>,
    active_streams: Arc<AtomicUsize>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `script` for `sql` (builder form)
    pub fn with_script(self, sql: &str, script: Script) -> Self {
        self.set_script(sql, script);
        self
    }

    /// Script used for any SQL without its own entry (builder form)
    pub fn with_fallback(self, script: Script) -> Self {
        *self.fallback.write() = Some(script);
        self
    }

    /// Register or replace the script for `sql`
    pub fn set_script(&self, sql: &str, script: Script) {
        self.scripts.write().insert(sql.to_string(), script);
    }

    /// Number of `execute` calls so far
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Total rows handed out across all streams
    pub fn rows_pulled(&self) -> usize {
        self.rows_pulled.load(Ordering::SeqCst)
    }

    /// Streams that have been created and not yet dropped
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }

    fn script_for(&self, sql: &str) -> Script {
        if let Some(script) = self.scripts.read().get(sql) {
            return script.clone();
        }
        self.fallback.read().clone().unwrap_or_else(|| {
            Script::failing(ExecutorError::Programming(format!(
                "no result set scripted for: {sql}"
            )))
        })
    }
}

/// Decrements the live-stream counter when the stream is dropped
struct StreamGuard(Arc<AtomicUsize>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Playback {
    rows: VecDeque<Row>,
    failure: Option<ExecutorError>,
    delay: Duration,
    row_delay: Duration,
    started: bool,
    rows_pulled: Arc<AtomicUsize>,
    _guard: StreamGuard,
}

impl QueryExecutor for ScriptedExecutor {
    fn execute(&self, sql: &str, _timeout: Duration) -> RowStream {
        self.executions.fetch_add(1, Ordering::SeqCst);
        self.active_streams.fetch_add(1, Ordering::SeqCst);

        let script = self.script_for(sql);
        let playback = Playback {
            rows: script.rows.into(),
            failure: script.failure,
            delay: script.delay,
            row_delay: script.row_delay,
            started: false,
            rows_pulled: Arc::clone(&self.rows_pulled),
            _guard: StreamGuard(Arc::clone(&self.active_streams)),
        };

        stream::unfold(playback, |mut p| async move {
            let wait = if p.started { p.row_delay } else { p.delay };
            p.started = true;
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
            if let Some(row) = p.rows.pop_front() {
                p.rows_pulled.fetch_add(1, Ordering::SeqCst);
                return Some((Ok(row), p));
            }
            let error = p.failure.take()?;
            Some((Err(error), p))
        })
        .boxed()
    }
}
