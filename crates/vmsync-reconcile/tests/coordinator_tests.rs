//! Run Coordinator and Snapshot Tests
//!
//! Covers the single-flight gate, status reporting and serving source
//! fetches from the snapshot file.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use vmsync_reconcile::reconciliation::{
    ReconciliationError, RunCoordinator, RunState, SnapshotCache, TriggerResult,
};

async fn wait_until_idle(coordinator: &RunCoordinator) {
    for _ in 0..200 {
        if !coordinator.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("run did not finish");
}

// =============================================================================
// Gate
// =============================================================================

#[tokio::test]
async fn test_trigger_rejects_while_running() {
    let (registry, _, _) = registry_with_prod();
    let source = Arc::new(
        StaticSource::new(vec![source_vm("a", "db1", "Prod", None)])
            .with_delay(Duration::from_millis(100)),
    );
    let coordinator = Arc::new(RunCoordinator::new(engine(source.clone(), registry.clone())));

    assert_eq!(coordinator.trigger(), TriggerResult::Accepted);
    assert!(coordinator.is_running());
    assert_eq!(coordinator.trigger(), TriggerResult::Rejected);
    assert!(matches!(
        coordinator.run_now().await,
        Err(ReconciliationError::AlreadyRunning)
    ));

    wait_until_idle(&coordinator).await;
    assert_eq!(source.list_calls(), 1);
    assert_eq!(registry.vms_named("db1").len(), 1);
    assert_eq!(coordinator.status().state, RunState::Succeeded);

    // The gate reopens once the run is done.
    assert_eq!(coordinator.trigger(), TriggerResult::Accepted);
    wait_until_idle(&coordinator).await;
    assert_eq!(source.list_calls(), 2);
}

#[tokio::test]
async fn test_trigger_reports_running_immediately() {
    let (registry, _, _) = registry_with_prod();
    let source = Arc::new(StaticSource::new(vec![source_vm("a", "db1", "Prod", None)]));
    let coordinator = Arc::new(RunCoordinator::new(engine(source, registry)));
    coordinator.run_now().await.unwrap();
    assert_eq!(coordinator.status().state, RunState::Succeeded);

    // The spawned run has not been polled yet on this runtime.
    assert_eq!(coordinator.trigger(), TriggerResult::Accepted);
    assert_eq!(coordinator.status().state, RunState::Running);

    wait_until_idle(&coordinator).await;
    assert_eq!(coordinator.status().state, RunState::Succeeded);
}

#[tokio::test]
async fn test_run_now_reports_status() {
    let (registry, _, _) = registry_with_prod();
    let source = Arc::new(StaticSource::new(vec![source_vm("a", "db1", "Prod", None)]));
    let coordinator = RunCoordinator::new(engine(source, registry));

    assert_eq!(coordinator.status().state, RunState::Idle);

    let report = coordinator.run_now().await.unwrap();
    assert_eq!(report.statistics.created, 1);

    let status = coordinator.status();
    assert_eq!(status.state, RunState::Succeeded);
    assert!(status.last_run_at.is_some());
    assert!(status.last_error.is_none());
    assert_eq!(status.last_statistics.unwrap().created, 1);
    assert!(status
        .last_run_log
        .iter()
        .any(|line| line == "db1 (a): created"));
    assert!(!coordinator.is_running());
}

#[tokio::test]
async fn test_failed_run_is_reported() {
    let (registry, _, _) = registry_with_prod();
    registry.fail_listing();
    let source = Arc::new(StaticSource::new(vec![]));
    let coordinator = RunCoordinator::new(engine(source, registry));

    assert!(coordinator.run_now().await.is_err());

    let status = coordinator.status();
    assert_eq!(status.state, RunState::Failed);
    assert!(status.last_error.unwrap().contains("registry is down"));
    assert!(!coordinator.is_running());
}

// =============================================================================
// Snapshot
// =============================================================================

#[tokio::test]
async fn test_stale_snapshot_fetches_live_and_refreshes() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vms.json");
    let (registry, _, _) = registry_with_prod();
    let source = Arc::new(StaticSource::new(vec![source_vm("a", "db1", "Prod", None)]));

    engine(source.clone(), registry)
        .with_snapshot(SnapshotCache::new(&path))
        .run()
        .await
        .unwrap();

    assert_eq!(source.list_calls(), 1);
    let written = SnapshotCache::new(&path).load().await.unwrap();
    assert_eq!(written.len(), 1);
    assert_eq!(written[0].name, "db1");
}

#[tokio::test]
async fn test_fresh_snapshot_replaces_live_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vms.json");
    SnapshotCache::new(&path)
        .store(&[source_vm("a", "cached1", "Prod", None)])
        .await
        .unwrap();

    let (registry, _, _) = registry_with_prod();
    let source = Arc::new(StaticSource::new(vec![source_vm("b", "live1", "Prod", None)]));

    let report = engine(source.clone(), registry.clone())
        .with_snapshot(SnapshotCache::new(&path))
        .run()
        .await
        .unwrap();

    assert_eq!(source.list_calls(), 0);
    assert!(report.outcome_for("cached1").is_some());
    assert_eq!(registry.vms_named("cached1").len(), 1);
    assert!(registry.vms_named("live1").is_empty());
}

#[tokio::test]
async fn test_unreadable_snapshot_falls_back_to_live() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vms.json");
    std::fs::write(&path, b"[{broken").unwrap();

    let (registry, _, _) = registry_with_prod();
    let source = Arc::new(StaticSource::new(vec![source_vm("b", "live1", "Prod", None)]));

    let report = engine(source.clone(), registry)
        .with_snapshot(SnapshotCache::new(&path))
        .run()
        .await
        .unwrap();

    assert_eq!(source.list_calls(), 1);
    assert_eq!(report.statistics.created, 1);
}
