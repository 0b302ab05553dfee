//! Integration tests for the eviction reconcile flow.
//!
//! These tests drive the controller (and the full runtime) against the
//! in-memory store:
//! 1. Scheduler-style writes append eviction tasks
//! 2. The predicate admits settled updates
//! 3. Workers assess, patch, and schedule re-checks
//!
//! Uses MemoryStore for both the scheduler side and the controller side.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use fleet_api::{
    AggregatedStatusItem, Binding, BindingKey, BindingStatus, ClusterHealth, EvictionTask,
};
use fleet_evictiond::runtime::RuntimeConfig;
use fleet_evictiond::{ControllerRuntime, EvictionController, NoopRecorder, ReconcileAction};
use fleet_queue::RateLimiterOptions;
use fleet_store::{BindingEventStream, BindingStore, MemoryStore, StoreError};
use tokio::sync::watch;

fn task(cluster: &str, age: Duration) -> EvictionTask {
    EvictionTask {
        cluster_name: cluster.to_string(),
        created_at: Some(Utc::now() - chrono::Duration::from_std(age).unwrap()),
        reason: Some("cluster failover".to_string()),
        ..Default::default()
    }
}

fn healthy(cluster: &str) -> AggregatedStatusItem {
    AggregatedStatusItem {
        cluster_name: cluster.to_string(),
        applied: true,
        health: ClusterHealth::Healthy,
    }
}

fn binding(name: &str, tasks: Vec<EvictionTask>, status: Vec<AggregatedStatusItem>) -> Binding {
    let mut binding = Binding::default();
    binding.metadata.namespace = "prod".to_string();
    binding.metadata.name = name.to_string();
    binding.spec.eviction_tasks = tasks;
    binding.status.aggregated_status = status;
    binding
}

fn controller(store: Arc<MemoryStore>, timeout: Duration) -> EvictionController {
    EvictionController::new(store, Arc::new(NoopRecorder), timeout)
}

#[tokio::test]
async fn test_expired_task_is_trimmed() {
    let store = Arc::new(MemoryStore::new());
    let stored = store.insert(binding(
        "web",
        vec![task("m1", Duration::from_secs(180))],
        vec![],
    ));

    let controller = controller(store.clone(), Duration::from_secs(120));
    let action = controller.reconcile(&stored.key()).await.unwrap();

    // Past its deadline: trimmed, nothing left to schedule.
    assert_eq!(action, ReconcileAction::Done);
    let current = store.get(&stored.key()).await.unwrap();
    assert!(current.spec.eviction_tasks.is_empty());
    assert_eq!(store.write_count(), 1);
}

#[tokio::test]
async fn test_converged_binding_issues_no_writes() {
    let store = Arc::new(MemoryStore::new());
    let stored = store.insert(binding(
        "web",
        vec![task("m1", Duration::from_secs(5))],
        vec![healthy("m1")],
    ));

    let controller = controller(store.clone(), Duration::from_secs(600));

    // Within the grace window and no confirmation elsewhere: kept.
    for _ in 0..3 {
        let action = controller.reconcile(&stored.key()).await.unwrap();
        match action {
            ReconcileAction::RequeueAfter(delay) => {
                assert!(delay > Duration::ZERO);
                assert!(delay <= Duration::from_secs(600));
            }
            other => panic!("expected requeue, got {other:?}"),
        }
    }

    // Repeated reconciles with no state change never write.
    assert_eq!(store.write_count(), 0);
    let current = store.get(&stored.key()).await.unwrap();
    assert_eq!(current.metadata.resource_version, stored.metadata.resource_version);
}

#[tokio::test]
async fn test_confirmed_migration_trims_before_timeout() {
    let store = Arc::new(MemoryStore::new());
    let stored = store.insert(binding(
        "web",
        vec![task("m1", Duration::from_secs(5))],
        vec![healthy("m2")],
    ));

    let controller = controller(store.clone(), Duration::from_secs(600));
    let action = controller.reconcile(&stored.key()).await.unwrap();

    assert_eq!(action, ReconcileAction::Done);
    let current = store.get(&stored.key()).await.unwrap();
    assert!(current.spec.eviction_tasks.is_empty());
}

#[tokio::test]
async fn test_missing_binding_is_success() {
    let store = Arc::new(MemoryStore::new());
    let controller = controller(store.clone(), Duration::from_secs(600));

    let action = controller
        .reconcile(&BindingKey::new("prod", "gone"))
        .await
        .unwrap();
    assert_eq!(action, ReconcileAction::Done);
}

#[tokio::test]
async fn test_deleting_binding_is_left_alone() {
    let store = Arc::new(MemoryStore::new());
    let mut doomed = binding("web", vec![task("m1", Duration::from_secs(3600))], vec![]);
    doomed.metadata.deletion_timestamp = Some(Utc::now());
    let stored = store.insert(doomed);

    let controller = controller(store.clone(), Duration::from_secs(120));
    let action = controller.reconcile(&stored.key()).await.unwrap();

    // Even with an expired task, a deleting binding gets no writes.
    assert_eq!(action, ReconcileAction::Done);
    assert_eq!(store.write_count(), 0);
}

/// Store wrapper whose reads are immediately made stale: every `get` bumps
/// the resource version behind the caller's back, so the next conditional
/// patch conflicts.
struct StaleReadStore {
    inner: Arc<MemoryStore>,
}

#[async_trait]
impl BindingStore for StaleReadStore {
    async fn get(&self, key: &BindingKey) -> Result<Binding, StoreError> {
        let binding = self.inner.get(key).await?;
        self.inner.update_status(key, binding.status.clone())?;
        Ok(binding)
    }

    async fn patch_eviction_tasks(
        &self,
        key: &BindingKey,
        expected_revision: u64,
        tasks: Vec<EvictionTask>,
    ) -> Result<Binding, StoreError> {
        self.inner
            .patch_eviction_tasks(key, expected_revision, tasks)
            .await
    }

    async fn watch(&self) -> Result<BindingEventStream, StoreError> {
        self.inner.watch().await
    }
}

#[tokio::test]
async fn test_lost_write_race_surfaces_as_conflict() {
    let inner = Arc::new(MemoryStore::new());
    let stored = inner.insert(binding(
        "web",
        vec![task("m1", Duration::from_secs(180))],
        vec![],
    ));

    let racy = Arc::new(StaleReadStore {
        inner: inner.clone(),
    });
    let controller = EvictionController::new(
        racy,
        Arc::new(NoopRecorder),
        Duration::from_secs(120),
    );

    let err = controller.reconcile(&stored.key()).await.unwrap_err();
    assert!(err.is_conflict());
    // The stale write must not have landed.
    let current = inner.get(&stored.key()).await.unwrap();
    assert_eq!(current.spec.eviction_tasks.len(), 1);
}

fn spawn_runtime(
    store: Arc<MemoryStore>,
    timeout: Duration,
) -> (tokio::task::JoinHandle<()>, watch::Sender<bool>) {
    let controller = Arc::new(EvictionController::new(
        store.clone(),
        Arc::new(NoopRecorder),
        timeout,
    ));
    let runtime = ControllerRuntime::new(
        store,
        controller,
        RuntimeConfig {
            workers: 2,
            sync_timeout: Duration::from_secs(5),
            limiter: RateLimiterOptions::default(),
        },
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        runtime.run(shutdown_rx).await;
    });
    (handle, shutdown_tx)
}

async fn wait_until_trimmed(store: &MemoryStore, key: &BindingKey, budget: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    while tokio::time::Instant::now() < deadline {
        if let Ok(current) = store.get(key).await {
            if current.spec.eviction_tasks.is_empty() {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    false
}

#[tokio::test]
async fn test_watch_driven_eviction_end_to_end() {
    let store = Arc::new(MemoryStore::new());
    let (handle, shutdown_tx) = spawn_runtime(store.clone(), Duration::from_secs(60));
    // Let the watch task subscribe before the scheduler writes.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // Scheduler creates the binding, then appends an eviction task for m1 in
    // a settled write (observed generation matches the bumped generation).
    let stored = store.insert(binding("web", vec![], vec![healthy("m1")]));
    let mut with_task = stored.clone();
    with_task.spec.eviction_tasks = vec![task("m1", Duration::from_secs(1))];
    with_task.status.scheduler_observed_generation = stored.metadata.generation + 1;
    let with_task = store.upsert(with_task);

    // m1 is still the only healthy cluster: the task must survive.
    tokio::time::sleep(Duration::from_millis(200)).await;
    let current = store.get(&with_task.key()).await.unwrap();
    assert_eq!(current.spec.eviction_tasks.len(), 1);
    assert_eq!(store.write_count(), 0);

    // Status collection now reports the workload healthy on m2 and gone from
    // m1: the next admitted update finalizes the eviction.
    store
        .update_status(
            &with_task.key(),
            BindingStatus {
                scheduler_observed_generation: with_task.status.scheduler_observed_generation,
                aggregated_status: vec![healthy("m2")],
            },
        )
        .unwrap();

    assert!(wait_until_trimmed(&store, &with_task.key(), Duration::from_secs(3)).await);
    assert_eq!(store.write_count(), 1);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_timer_driven_expiry_without_further_events() {
    let store = Arc::new(MemoryStore::new());
    let (handle, shutdown_tx) = spawn_runtime(store.clone(), Duration::from_secs(1));
    // Let the watch task subscribe before the scheduler writes.
    tokio::time::sleep(Duration::from_millis(100)).await;

    // One settled update carrying a fresh task, then silence: only the
    // queue's timer entries can finish the job.
    let stored = store.insert(binding("web", vec![], vec![healthy("m1")]));
    let mut with_task = stored.clone();
    with_task.spec.eviction_tasks = vec![task("m1", Duration::ZERO)];
    with_task.status.scheduler_observed_generation = stored.metadata.generation + 1;
    let with_task = store.upsert(with_task);

    assert!(wait_until_trimmed(&store, &with_task.key(), Duration::from_secs(4)).await);

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}
