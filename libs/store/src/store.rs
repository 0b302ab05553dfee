//! The store contract the controller is written against.

use async_trait::async_trait;
use fleet_api::{Binding, BindingKey, EvictionTask};

use crate::error::StoreError;
use crate::event::BindingEventStream;

/// Minimal store contract for bindings.
///
/// Implementations are constructor-injected into the controller; there is no
/// ambient client. All mutation goes through the conditional patch.
#[async_trait]
pub trait BindingStore: Send + Sync {
    /// Fetch the current state of a binding.
    async fn get(&self, key: &BindingKey) -> Result<Binding, StoreError>;

    /// Replace `spec.eviction_tasks`, conditional on the resource version the
    /// caller read. All other fields are untouched.
    ///
    /// Returns the binding as written. Fails with
    /// [`StoreError::Conflict`] when `expected_revision` is stale.
    async fn patch_eviction_tasks(
        &self,
        key: &BindingKey,
        expected_revision: u64,
        tasks: Vec<EvictionTask>,
    ) -> Result<Binding, StoreError>;

    /// Subscribe to change notifications for all bindings.
    ///
    /// The stream is infinite but may break; callers re-subscribe on error.
    async fn watch(&self) -> Result<BindingEventStream, StoreError>;
}
