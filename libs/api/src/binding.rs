//! Binding, its spec/status halves, and the eviction bookkeeping types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::key::BindingKey;

/// Object metadata shared by all stored objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    /// Namespace the object lives in.
    pub namespace: String,

    /// Object name, unique within the namespace.
    pub name: String,

    /// Spec generation. Incremented by the store on every spec change.
    #[serde(default)]
    pub generation: i64,

    /// Optimistic-concurrency token. Incremented by the store on every write;
    /// conditional patches carry the value they read.
    #[serde(default)]
    pub resource_version: u64,

    /// Set when deletion has been requested; the object is going away.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

impl ObjectMeta {
    /// Whether deletion is in progress.
    pub fn is_deleting(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// The durable record of "this workload is placed according to this policy".
///
/// The scheduler writes placement and appends eviction tasks; the eviction
/// controller trims completed tasks. Per-key queue deduplication guarantees
/// the two never run a reconcile for the same binding concurrently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    /// Object metadata.
    pub metadata: ObjectMeta,

    /// Desired state: placement plus pending evictions.
    pub spec: BindingSpec,

    /// Observed state, supplied by status collection upstream.
    #[serde(default)]
    pub status: BindingStatus,
}

impl Binding {
    /// Queue key for this binding.
    pub fn key(&self) -> BindingKey {
        BindingKey::new(self.metadata.namespace.clone(), self.metadata.name.clone())
    }
}

/// Desired state of a binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSpec {
    /// Clusters the workload is currently scheduled to. Opaque to the
    /// eviction controller.
    #[serde(default)]
    pub clusters: Vec<TargetCluster>,

    /// Pending evictions, at most one per cluster name. Appended by the
    /// scheduler, trimmed by the eviction controller.
    #[serde(default)]
    pub eviction_tasks: Vec<EvictionTask>,
}

/// One cluster the workload is placed on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetCluster {
    /// Cluster name.
    pub name: String,

    /// Replicas assigned to this cluster, when the workload is divisible.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
}

/// A pending request to stop serving the workload from one cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvictionTask {
    /// Cluster being evacuated.
    pub cluster_name: String,

    /// When eviction was requested. A task without a creation timestamp is
    /// malformed and treated as already expired.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Per-task grace period override. Falls back to the controller's global
    /// eviction timeout when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period_seconds: Option<i64>,

    /// Free-form reason for the eviction. Diagnostic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Component that produced the task. Diagnostic only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer: Option<String>,
}

impl EvictionTask {
    /// Grace period override as a duration, if set. Values outside chrono's
    /// representable range saturate instead of panicking.
    pub fn grace_period(&self) -> Option<Duration> {
        self.grace_period_seconds.map(|secs| {
            Duration::try_seconds(secs).unwrap_or(if secs < 0 {
                Duration::MIN
            } else {
                Duration::MAX
            })
        })
    }
}

/// Observed state of a binding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingStatus {
    /// The spec generation the scheduler most recently acted on. Placement is
    /// settled when this equals `metadata.generation`.
    #[serde(default)]
    pub scheduler_observed_generation: i64,

    /// Per-cluster observed health/applied state of the workload.
    #[serde(default)]
    pub aggregated_status: Vec<AggregatedStatusItem>,
}

/// Observed workload health on one cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterHealth {
    /// Workload reports healthy.
    Healthy,
    /// Workload reports unhealthy.
    Unhealthy,
    /// Health could not be determined.
    Unknown,
}

impl Default for ClusterHealth {
    fn default() -> Self {
        Self::Unknown
    }
}

/// Per-cluster status snapshot, read-only input to eviction assessment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregatedStatusItem {
    /// Cluster this entry describes.
    pub cluster_name: String,

    /// Whether the workload has been applied to the cluster.
    #[serde(default)]
    pub applied: bool,

    /// Observed workload health on the cluster.
    #[serde(default)]
    pub health: ClusterHealth,
}

impl AggregatedStatusItem {
    /// The criterion for "the workload is confirmed running here".
    ///
    /// Kept in one place so the criterion can change with the status schema
    /// without touching assessment.
    pub fn is_healthy(&self) -> bool {
        self.applied && self.health == ClusterHealth::Healthy
    }
}
