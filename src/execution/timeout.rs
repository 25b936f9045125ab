//! Query Timeout and Cancellation
//!
//! Provides the two ways a running query can be stopped early:
//! - A wall-clock bound on the executor call (`TimeoutError`)
//! - Cooperative cancellation requested by another task (`CancelHandle`)
//!
//! ## Design
//!
//! `CancelHandle` wraps a `tokio::sync::watch` channel. Any clone can flip
//! the flag, and the execution driver awaits `cancelled()` alongside the
//! executor so it wakes up as soon as cancellation is requested.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Timeout error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Query exceeded timeout of {timeout:?} (ran for {elapsed:?})")]
pub struct TimeoutError {
    /// The timeout duration that was exceeded
    pub timeout: Duration,
    /// How long the query actually ran
    pub elapsed: Duration,
}

/// Handle for cancelling a running query from another task
///
/// Cloning is cheap; all clones observe the same flag.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    /// Create a handle in the not-cancelled state
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        CancelHandle { tx: Arc::new(tx) }
    }

    /// Request cancellation. Repeated calls are no-ops.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Check if cancellation has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once cancellation has been requested.
    ///
    /// Returns immediately if the handle is already cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so the channel cannot close here.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}
