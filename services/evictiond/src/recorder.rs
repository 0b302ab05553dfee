//! Fire-and-forget event emission.
//!
//! Recording can never fail from the controller's point of view and never
//! blocks the control loop; an implementation that talks to an external sink
//! must swallow its own errors.

use fleet_api::BindingKey;
use tracing::info;

/// Event reason constants.
pub mod reasons {
    /// An eviction task was finalized and removed from its binding.
    pub const EVICTION_FINALIZED: &str = "EvictionFinalized";
}

/// Sink for structured controller events.
pub trait EventRecorder: Send + Sync {
    /// Record one event for a binding.
    fn event(&self, key: &BindingKey, reason: &str, message: &str);
}

/// Recorder that emits events to the tracing pipeline.
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn event(&self, key: &BindingKey, reason: &str, message: &str) {
        info!(binding = %key, reason, message, "Event");
    }
}

/// Recorder that drops everything. For tests.
pub struct NoopRecorder;

impl EventRecorder for NoopRecorder {
    fn event(&self, _key: &BindingKey, _reason: &str, _message: &str) {}
}
