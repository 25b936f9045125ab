//! Query registry lifecycle tests
//!
//! Tests for:
//! - Submission and immediate visibility
//! - Completion, truncation and failure recording
//! - Listing order and status filtering
//! - TTL pruning and administrative expiry
//! - Shutdown semantics

mod common;

use std::time::Duration;

use common::{registry_with, registry_with_config, wait_terminal, wait_until};
use query_registry::executor::{numbered_rows, row};
use query_registry::{
    ExecutionError, ExecutorError, FailureKind, QueryOptions, QueryStatus, RegistryConfig,
    RegistryError, Script, ScriptedExecutor,
};
use serde_json::Value;

fn slow(rows: usize) -> Script {
    Script::rows(numbered_rows(rows)).with_delay(Duration::from_secs(30))
}

// ============================================================================
// Submission
// ============================================================================

#[tokio::test]
async fn test_select_one_scenario() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_script(
        "SELECT 1",
        Script::rows(vec![row([("?column?", Value::from(1))])]),
    ));

    let id = registry
        .execute_query("SELECT 1", QueryOptions::default())
        .unwrap();
    assert_eq!(
        registry.get_snapshot(&id).unwrap().status,
        QueryStatus::Running
    );

    let snapshot = wait_terminal(&registry, &id).await;
    assert_eq!(snapshot.status, QueryStatus::Completed);
    assert_eq!(snapshot.row_count, 1);
    assert!(!snapshot.truncated);
    assert!(snapshot.error.is_none());

    let page = registry.get_rows(&id, 0, 10).unwrap();
    assert_eq!(page.rows[0]["?column?"], 1);
}

#[tokio::test]
async fn test_every_submission_starts_running() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_fallback(Script::rows(vec![])));
    let options = [
        QueryOptions::default(),
        QueryOptions::default().with_max_inline_rows(1),
        QueryOptions::default().with_query_timeout(Duration::from_millis(10)),
        QueryOptions::default().with_poll_interval(Duration::from_millis(100)),
    ];
    for (i, opts) in options.into_iter().enumerate() {
        let id = registry
            .execute_query(&format!("SELECT {i}"), opts)
            .unwrap();
        assert_eq!(
            registry.get_snapshot(&id).unwrap().status,
            QueryStatus::Running
        );
    }
}

#[tokio::test]
async fn test_identifiers_are_unique() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_fallback(Script::rows(vec![])));
    let mut ids: Vec<String> = (0..50)
        .map(|_| {
            registry
                .execute_query("SELECT 1", QueryOptions::default())
                .unwrap()
        })
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 50);
    assert_eq!(registry.len(), 50);
}

#[tokio::test]
async fn test_unknown_id_is_absent_not_error() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new());
    assert!(registry.get_snapshot("no-such-query").is_none());
    assert!(registry.get_rows("no-such-query", 0, 10).is_none());
    assert!(registry.get_error("no-such-query").is_none());
}

#[tokio::test]
async fn test_validation_error_is_synchronous() {
    let (registry, exec) = registry_with(ScriptedExecutor::new());
    let options = QueryOptions {
        query_timeout: Some(-1.0),
        ..Default::default()
    };
    let err = registry.execute_query("SELECT 1", options).unwrap_err();
    assert!(matches!(err, RegistryError::InvalidOptions(_)));
    assert!(registry.is_empty());
    assert_eq!(exec.executions(), 0);
}

// ============================================================================
// Results
// ============================================================================

#[tokio::test]
async fn test_truncation_at_cap() {
    let (registry, exec) =
        registry_with(ScriptedExecutor::new().with_script("SELECT 3", Script::rows(numbered_rows(3))));
    let id = registry
        .execute_query("SELECT 3", QueryOptions::default().with_max_inline_rows(2))
        .unwrap();

    let snapshot = wait_terminal(&registry, &id).await;
    assert_eq!(snapshot.status, QueryStatus::Completed);
    assert_eq!(snapshot.row_count, 2);
    assert!(snapshot.truncated);

    let page = registry.get_rows(&id, 0, 100).unwrap();
    assert_eq!(page.rows.len(), 2);
    assert!(page.truncated);
    assert_eq!(exec.rows_pulled(), 3);
}

#[tokio::test]
async fn test_large_result_stops_consuming() {
    let (registry, exec) = registry_with(
        ScriptedExecutor::new().with_script("SELECT big", Script::rows(numbered_rows(10_000))),
    );
    let id = registry
        .execute_query("SELECT big", QueryOptions::default().with_max_inline_rows(10))
        .unwrap();

    let snapshot = wait_terminal(&registry, &id).await;
    assert_eq!(snapshot.row_count, 10);
    assert!(snapshot.truncated);
    assert_eq!(exec.rows_pulled(), 11);
    assert_eq!(exec.active_streams(), 0);
}

#[tokio::test]
async fn test_exact_cap_not_truncated() {
    let (registry, _exec) =
        registry_with(ScriptedExecutor::new().with_script("q", Script::rows(numbered_rows(5))));
    let id = registry
        .execute_query("q", QueryOptions::default().with_max_inline_rows(5))
        .unwrap();
    let snapshot = wait_terminal(&registry, &id).await;
    assert_eq!(snapshot.row_count, 5);
    assert!(!snapshot.truncated);
}

#[tokio::test]
async fn test_result_paging() {
    let (registry, _exec) =
        registry_with(ScriptedExecutor::new().with_script("q", Script::rows(numbered_rows(7))));
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    wait_terminal(&registry, &id).await;

    let first = registry.get_rows(&id, 0, 3).unwrap();
    assert_eq!(first.rows.len(), 3);
    assert!(first.has_more());
    let last = registry.get_rows(&id, 6, 3).unwrap();
    assert_eq!(last.rows.len(), 1);
    assert_eq!(last.rows[0]["n"], 6);
    assert!(!last.has_more());
}

#[tokio::test]
async fn test_rows_empty_while_running() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_fallback(slow(3)));
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    let page = registry.get_rows(&id, 0, 10).unwrap();
    assert_eq!(page.status, QueryStatus::Running);
    assert!(page.rows.is_empty());
    registry.close().await;
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_timeout_recorded_as_failed() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_script(
        "SELECT pg_sleep(10)",
        Script::rows(numbered_rows(1)).with_delay(Duration::from_secs(10)),
    ));
    let id = registry
        .execute_query(
            "SELECT pg_sleep(10)",
            QueryOptions::default().with_query_timeout(Duration::from_millis(50)),
        )
        .expect("submission must not surface execution failures");

    let snapshot = wait_terminal(&registry, &id).await;
    assert_eq!(snapshot.status, QueryStatus::Failed);
    let failure = snapshot.error.expect("failed query has an error");
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(!failure.message.is_empty());
    assert_eq!(snapshot.row_count, 0);

    match registry.get_error(&id) {
        Some(ExecutionError::Timeout(err)) => {
            assert_eq!(err.timeout, Duration::from_millis(50));
            assert!(err.elapsed >= Duration::from_millis(50));
        }
        other => panic!("expected timeout error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_error_kinds_preserved() {
    let cases = [
        (ExecutorError::Programming("syntax".into()), FailureKind::Programming),
        (ExecutorError::Operational("conn reset".into()), FailureKind::Operational),
        (ExecutorError::Data("overflow".into()), FailureKind::Data),
        (ExecutorError::Integrity("duplicate".into()), FailureKind::Integrity),
        (ExecutorError::NotSupported("window fn".into()), FailureKind::NotSupported),
        (ExecutorError::Timeout(Duration::from_secs(1)), FailureKind::Timeout),
    ];
    let exec = ScriptedExecutor::new();
    for (i, (err, _)) in cases.iter().enumerate() {
        exec.set_script(&format!("q{i}"), Script::failing(err.clone()));
    }
    let (registry, _exec) = registry_with(exec);

    for (i, (_, kind)) in cases.iter().enumerate() {
        let id = registry
            .execute_query(&format!("q{i}"), QueryOptions::default())
            .unwrap();
        let snapshot = wait_terminal(&registry, &id).await;
        assert_eq!(snapshot.status, QueryStatus::Failed);
        assert_eq!(snapshot.error.unwrap().kind, *kind);
    }
}

#[tokio::test]
async fn test_mid_stream_failure_keeps_no_rows() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_script(
        "q",
        Script::rows(numbered_rows(4)).then_fail(ExecutorError::Operational("lost".into())),
    ));
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    let snapshot = wait_terminal(&registry, &id).await;
    assert_eq!(snapshot.status, QueryStatus::Failed);
    assert_eq!(snapshot.row_count, 0);
    assert!(!snapshot.truncated);
}

#[tokio::test]
async fn test_failure_past_cap_is_not_reached() {
    // The error sits after row 5; with a cap of 2 the driver stops at row 3.
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_script(
        "q",
        Script::rows(numbered_rows(5)).then_fail(ExecutorError::Data("late".into())),
    ));
    let id = registry
        .execute_query("q", QueryOptions::default().with_max_inline_rows(2))
        .unwrap();
    let snapshot = wait_terminal(&registry, &id).await;
    assert_eq!(snapshot.status, QueryStatus::Completed);
    assert!(snapshot.truncated);
}

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_in_submission_order() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new().with_fallback(slow(1)));
    let ids: Vec<String> = (0..20)
        .map(|i| {
            registry
                .execute_query(&format!("SELECT {i}"), QueryOptions::default())
                .unwrap()
        })
        .collect();

    let listed: Vec<String> = registry
        .list_queries(None)
        .into_iter()
        .map(|s| s.query_id)
        .collect();
    assert_eq!(listed, ids);
    registry.close().await;
}

#[tokio::test]
async fn test_list_running_filter_keeps_order() {
    let exec = ScriptedExecutor::new()
        .with_script("fast", Script::rows(numbered_rows(1)))
        .with_fallback(slow(1));
    let (registry, _exec) = registry_with(exec);

    let fast = registry.execute_query("fast", QueryOptions::default()).unwrap();
    let second = registry.execute_query("slow-a", QueryOptions::default()).unwrap();
    let third = registry.execute_query("slow-b", QueryOptions::default()).unwrap();

    let running: Vec<String> = registry
        .list_queries(Some(QueryStatus::Running))
        .into_iter()
        .map(|s| s.query_id)
        .collect();
    assert_eq!(running, vec![fast.clone(), second.clone(), third.clone()]);

    wait_terminal(&registry, &fast).await;

    let running: Vec<String> = registry
        .list_queries(Some(QueryStatus::Running))
        .into_iter()
        .map(|s| s.query_id)
        .collect();
    assert_eq!(running, vec![second.clone(), third.clone()]);

    let completed = registry.list_queries(Some(QueryStatus::Completed));
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].query_id, fast);

    let all: Vec<String> = registry
        .list_queries(None)
        .into_iter()
        .map(|s| s.query_id)
        .collect();
    assert_eq!(all, vec![fast, second, third]);
    registry.close().await;
}

#[tokio::test]
async fn test_snapshots_are_independent_copies() {
    let (registry, _exec) =
        registry_with(ScriptedExecutor::new().with_script("q", Script::rows(numbered_rows(2))));
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    let early = registry.get_snapshot(&id).unwrap();
    let listed_early = registry.list_queries(None);

    wait_terminal(&registry, &id).await;

    assert_eq!(early.status, QueryStatus::Running);
    assert_eq!(early.row_count, 0);
    assert_eq!(listed_early[0].status, QueryStatus::Running);
}

// ============================================================================
// TTL and pruning
// ============================================================================

#[tokio::test]
async fn test_prune_removes_exactly_expired() {
    let (registry, _exec) =
        registry_with(ScriptedExecutor::new().with_fallback(Script::rows(numbered_rows(1))));
    let ids: Vec<String> = (0..6)
        .map(|i| {
            registry
                .execute_query(&format!("SELECT {i}"), QueryOptions::default())
                .unwrap()
        })
        .collect();
    for id in &ids {
        wait_terminal(&registry, id).await;
    }

    let expired: Vec<&String> = ids.iter().step_by(2).collect();
    for id in &expired {
        assert!(registry.expire_query(id));
    }

    assert_eq!(registry.prune_expired(), expired.len());
    for id in &ids {
        let present = registry.get_snapshot(id).is_some();
        assert_eq!(present, !expired.contains(&id), "query {id}");
    }
    assert_eq!(registry.prune_expired(), 0);
}

#[tokio::test]
async fn test_ttl_not_reset_on_completion() {
    let (registry, _exec) =
        registry_with(ScriptedExecutor::new().with_fallback(Script::rows(numbered_rows(1))));
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    let submitted = registry.get_snapshot(&id).unwrap();
    let finished = wait_terminal(&registry, &id).await;
    assert_eq!(submitted.ttl_expires_at, finished.ttl_expires_at);
    assert_eq!(
        finished.ttl_expires_at - finished.created_at,
        chrono::TimeDelta::seconds(3600)
    );
}

#[tokio::test]
async fn test_short_ttl_expires_naturally() {
    let config = RegistryConfig {
        default_ttl_secs: 1,
        ..Default::default()
    };
    let (registry, _exec) =
        registry_with_config(ScriptedExecutor::new().with_fallback(Script::rows(vec![])), config);
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    assert_eq!(registry.prune_expired(), 0);

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert_eq!(registry.prune_expired(), 1);
    assert!(registry.get_snapshot(&id).is_none());
}

#[tokio::test]
async fn test_prune_cancels_running_driver() {
    let (registry, exec) = registry_with(ScriptedExecutor::new().with_fallback(slow(1)));
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    wait_until(|| exec.active_streams() == 1).await;

    registry.expire_query(&id);
    assert_eq!(registry.prune_expired(), 1);
    assert!(registry.get_snapshot(&id).is_none());

    wait_until(|| exec.active_streams() == 0).await;
    assert!(registry.list_queries(None).is_empty());
}

#[tokio::test]
async fn test_status_transition_never_removes_record() {
    let (registry, _exec) = registry_with(
        ScriptedExecutor::new()
            .with_script("ok", Script::rows(numbered_rows(1)))
            .with_script("bad", Script::failing(ExecutorError::Data("x".into())))
            .with_fallback(slow(1)),
    );
    let ok = registry.execute_query("ok", QueryOptions::default()).unwrap();
    let bad = registry.execute_query("bad", QueryOptions::default()).unwrap();
    let cancelled = registry.execute_query("slow", QueryOptions::default()).unwrap();
    assert!(registry.cancel_query(&cancelled));

    wait_terminal(&registry, &ok).await;
    wait_terminal(&registry, &bad).await;
    assert_eq!(registry.len(), 3);
    registry.close().await;
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_close_clears_and_is_idempotent() {
    let (registry, exec) = registry_with(
        ScriptedExecutor::new()
            .with_script("done", Script::rows(numbered_rows(1)))
            .with_fallback(slow(5)),
    );
    let done = registry.execute_query("done", QueryOptions::default()).unwrap();
    wait_terminal(&registry, &done).await;
    for i in 0..5 {
        registry
            .execute_query(&format!("SELECT {i}"), QueryOptions::default())
            .unwrap();
    }

    registry.close().await;
    assert!(registry.list_queries(None).is_empty());
    assert!(registry.get_snapshot(&done).is_none());
    assert_eq!(exec.active_streams(), 0);

    registry.close().await;
    assert!(registry.list_queries(None).is_empty());
    assert!(registry.is_closed());
}

#[tokio::test]
async fn test_close_awaits_pruned_drivers() {
    let (registry, exec) = registry_with(ScriptedExecutor::new().with_fallback(slow(1)));
    let id = registry.execute_query("q", QueryOptions::default()).unwrap();
    wait_until(|| exec.active_streams() == 1).await;

    registry.expire_query(&id);
    registry.prune_expired();
    registry.close().await;
    assert_eq!(exec.active_streams(), 0);
}

#[tokio::test]
async fn test_submit_after_close_fails() {
    let (registry, _exec) = registry_with(ScriptedExecutor::new());
    registry.close().await;
    assert_eq!(
        registry.execute_query("SELECT 1", QueryOptions::default()),
        Err(RegistryError::Closed)
    );
}
