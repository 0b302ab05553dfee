//! Event admission filtering.
//!
//! Small pure boolean functions over the typed watch event, composed at
//! registration time. An event reaches the queue only if every filter
//! admits it. This keeps reconcile storms out while a scheduling decision
//! is still in flight: eviction bookkeeping only reacts to updates of
//! existing objects whose placement has settled.

use fleet_store::BindingEvent;

/// One admission condition.
pub type EventFilter = fn(&BindingEvent) -> bool;

/// Only updates matter: creations carry no settled placement yet and
/// deletions make eviction bookkeeping moot.
pub fn is_update(event: &BindingEvent) -> bool {
    matches!(event, BindingEvent::Updated { .. })
}

/// There is eviction work on the object.
pub fn has_pending_evictions(event: &BindingEvent) -> bool {
    !event.binding().spec.eviction_tasks.is_empty()
}

/// The scheduler has fully observed the current spec generation; the most
/// recent placement decision has landed.
pub fn placement_settled(event: &BindingEvent) -> bool {
    let binding = event.binding();
    binding.status.scheduler_observed_generation == binding.metadata.generation
}

/// The filter set the eviction controller registers with.
pub const EVICTION_FILTERS: &[EventFilter] = &[is_update, has_pending_evictions, placement_settled];

/// Whether `event` passes every filter.
pub fn admits(filters: &[EventFilter], event: &BindingEvent) -> bool {
    filters.iter().all(|filter| filter(event))
}
