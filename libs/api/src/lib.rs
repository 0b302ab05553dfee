//! # fleet-api
//!
//! Binding object model for the fleet-mc platform.
//!
//! A *binding* records where a workload is currently placed and carries the
//! in-flight eviction bookkeeping for clusters the scheduler has decided to
//! stop using. The scheduler owns placement (`spec.clusters`) and appends
//! eviction tasks; the eviction controller trims completed tasks.
//!
//! ## Design Principles
//!
//! - Types are plain data: serde round-trips, no behavior beyond small
//!   accessors
//! - Change detection is field-wise value equality (`PartialEq` derives),
//!   never reflective comparison
//! - Timestamps compare at full precision; kept tasks are copied verbatim so
//!   an unchanged task always compares equal to the fetched one

mod binding;
mod key;

pub use binding::*;
pub use key::{BindingKey, KeyError};
