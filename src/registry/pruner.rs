//! Background pruning of expired queries
//!
//! Calls [`QueryRegistry::prune_expired`] on a fixed period until it is
//! shut down, dropped, or the registry is closed.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::QueryRegistry;

/// Handle to a running pruner task
///
/// Dropping the handle also stops the task.
pub struct Pruner {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Pruner {
    /// Spawn a pruner sweeping every `interval`. Must be called from within
    /// a Tokio runtime.
    pub fn spawn(registry: Arc<QueryRegistry>, interval: Duration) -> Self {
        let interval = interval.max(Duration::from_millis(1));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if registry.is_closed() {
                            tracing::debug!("pruner_stopped_registry_closed");
                            break;
                        }
                        let pruned = registry.prune_expired();
                        if pruned > 0 {
                            tracing::debug!(pruned, "pruner_sweep");
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("pruner_shutting_down");
                        break;
                    }
                }
            }
        });

        Pruner { shutdown_tx, task }
    }

    /// Spawn a pruner using the registry's configured interval, or `None`
    /// when background pruning is disabled
    pub fn from_config(registry: Arc<QueryRegistry>) -> Option<Self> {
        let interval = registry.config().prune_interval()?;
        Some(Self::spawn(registry, interval))
    }

    /// Whether the pruner task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the pruner and wait for its task to exit
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(err) = self.task.await {
            if err.is_panic() {
                tracing::warn!(error = %err, "pruner_panicked");
            }
        }
    }
}
