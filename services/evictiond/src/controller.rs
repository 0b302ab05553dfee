//! The reconcile cycle for one binding.
//!
//! Fetch → assess → diff → conditional patch → schedule. One instant is
//! captured per cycle so every task is judged against the same `now`; at
//! most one write is issued per cycle and none when the binding is already
//! converged.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Utc;
use fleet_api::{Binding, BindingKey};
use fleet_store::{BindingStore, StoreError};
use tracing::{debug, info};

use crate::assess::{assess_eviction_tasks, next_retry};
use crate::recorder::{reasons, EventRecorder};

/// What the runtime should do after a successful cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Nothing left to schedule; the next external event drives the binding.
    Done,

    /// Re-invoke for this binding after the given delay.
    RequeueAfter(StdDuration),
}

/// Graceful eviction controller.
///
/// All collaborators are constructor-injected; the controller holds no
/// ambient state and one instance serves all bindings (the queue's per-key
/// deduplication serializes cycles per binding).
pub struct EvictionController {
    store: Arc<dyn BindingStore>,
    recorder: Arc<dyn EventRecorder>,
    eviction_timeout: chrono::Duration,
}

impl EvictionController {
    /// Create a controller with the given global eviction timeout.
    pub fn new(
        store: Arc<dyn BindingStore>,
        recorder: Arc<dyn EventRecorder>,
        eviction_timeout: StdDuration,
    ) -> Self {
        Self {
            store,
            recorder,
            eviction_timeout: chrono::Duration::from_std(eviction_timeout)
                .unwrap_or(chrono::Duration::MAX),
        }
    }

    /// Run one reconcile cycle for `key`.
    ///
    /// Errors are requeue signals for the runtime; a vanished or deleting
    /// binding is success (its eviction bookkeeping is moot).
    pub async fn reconcile(&self, key: &BindingKey) -> Result<ReconcileAction, StoreError> {
        debug!(binding = %key, "Reconciling binding");

        let binding = match self.store.get(key).await {
            Ok(binding) => binding,
            Err(err) if err.is_not_found() => {
                debug!(binding = %key, "Binding gone, nothing to do");
                return Ok(ReconcileAction::Done);
            }
            Err(err) => return Err(err),
        };

        if binding.metadata.is_deleting() {
            debug!(binding = %key, "Binding is being deleted, nothing to do");
            return Ok(ReconcileAction::Done);
        }

        // One instant for the whole cycle.
        let now = Utc::now();
        let kept = assess_eviction_tasks(
            &binding.spec.eviction_tasks,
            &binding.status.aggregated_status,
            self.eviction_timeout,
            now,
        );

        if kept != binding.spec.eviction_tasks {
            let finalized = finalized_clusters(&binding, &kept);
            self.store
                .patch_eviction_tasks(key, binding.metadata.resource_version, kept.clone())
                .await?;
            info!(
                binding = %key,
                kept = kept.len(),
                finalized = ?finalized,
                "Trimmed completed eviction tasks"
            );
            for cluster in finalized {
                self.recorder.event(
                    key,
                    reasons::EVICTION_FINALIZED,
                    &format!("Eviction from cluster {cluster} completed"),
                );
            }
        }

        match next_retry(&kept, self.eviction_timeout, now) {
            Some(delay) => {
                debug!(binding = %key, delay_secs = delay.as_secs(), "Scheduling re-check");
                Ok(ReconcileAction::RequeueAfter(delay))
            }
            None => Ok(ReconcileAction::Done),
        }
    }
}

/// Clusters whose eviction just completed: present in the binding's tasks,
/// absent from the kept set. Collapsed duplicates do not count on their own.
fn finalized_clusters(binding: &Binding, kept: &[fleet_api::EvictionTask]) -> Vec<String> {
    let kept_names: HashSet<&str> = kept.iter().map(|t| t.cluster_name.as_str()).collect();
    let mut seen = HashSet::new();
    binding
        .spec
        .eviction_tasks
        .iter()
        .filter(|task| !kept_names.contains(task.cluster_name.as_str()))
        .filter(|task| seen.insert(task.cluster_name.clone()))
        .map(|task| task.cluster_name.clone())
        .collect()
}
