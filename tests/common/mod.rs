//! Shared helpers for registry integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use query_registry::{QueryRegistry, QuerySnapshot, RegistryConfig, ScriptedExecutor};

/// Registry over `executor` with default configuration
pub fn registry_with(executor: ScriptedExecutor) -> (Arc<QueryRegistry>, Arc<ScriptedExecutor>) {
    registry_with_config(executor, RegistryConfig::default())
}

pub fn registry_with_config(
    executor: ScriptedExecutor,
    config: RegistryConfig,
) -> (Arc<QueryRegistry>, Arc<ScriptedExecutor>) {
    let executor = Arc::new(executor);
    let registry = QueryRegistry::new(config, executor.clone()).expect("valid config");
    (Arc::new(registry), executor)
}

/// Poll until the query reaches a terminal state (5s deadline)
pub async fn wait_terminal(registry: &QueryRegistry, query_id: &str) -> QuerySnapshot {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let snapshot = registry
            .get_snapshot(query_id)
            .unwrap_or_else(|| panic!("query {query_id} disappeared"));
        if snapshot.status.is_terminal() {
            return snapshot;
        }
        assert!(
            Instant::now() < deadline,
            "query {query_id} still {} after 5s",
            snapshot.status
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Poll until `condition` holds (5s deadline)
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met within 5s");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
