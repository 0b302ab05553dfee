//! fleet-mc Eviction Controller Library
//!
//! `evictiond` manages the safe, time-bounded withdrawal of workloads from
//! clusters the scheduler has decided to stop using. The scheduler appends
//! eviction tasks to a binding; this controller finalizes each task once the
//! workload is confirmed running elsewhere, or unconditionally once its grace
//! window expires, and trims it from the binding.
//!
//! ## Architecture
//!
//! ```text
//! watch stream ──▶ predicate ──▶ work queue ──▶ worker pool
//!                                    ▲               │
//!                                    │    fetch → assess → patch
//!                                    └──── requeue-after ────┘
//! ```
//!
//! ## Modules
//!
//! - `assess`: pure eviction assessment and retry scheduling
//! - `controller`: the fetch → assess → patch → schedule reconcile cycle
//! - `predicate`: event admission filtering
//! - `runtime`: watch/queue/worker wiring and shutdown
//! - `recorder`: fire-and-forget event emission

pub mod assess;
pub mod config;
pub mod controller;
pub mod predicate;
pub mod recorder;
pub mod runtime;

// Re-export commonly used types
pub use controller::{EvictionController, ReconcileAction};
pub use recorder::{EventRecorder, NoopRecorder, TracingRecorder};
pub use runtime::{ControllerRuntime, RuntimeConfig};
