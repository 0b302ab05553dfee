//! # fleet-store
//!
//! Object store and watch client for fleet-mc bindings.
//!
//! This crate is the I/O boundary of the eviction controller:
//!
//! - [`BindingStore`] is the minimal store contract: `get`, a conditional
//!   patch of `spec.eviction_tasks`, and an infinite (restartable) watch.
//! - [`HttpBindingStore`] talks to the placement API over HTTP with JSON
//!   bodies, `If-Match` optimistic concurrency, and an NDJSON watch stream.
//! - [`MemoryStore`] is an in-process implementation for tests and local
//!   development.
//!
//! Watch notifications are delivered as typed [`BindingEvent`] values; there
//! is no generic-event-to-concrete-type cast anywhere downstream.

mod error;
mod event;
mod http;
mod memory;
mod store;

pub use error::StoreError;
pub use event::{BindingEvent, BindingEventStream};
pub use http::HttpBindingStore;
pub use memory::MemoryStore;
pub use store::BindingStore;
