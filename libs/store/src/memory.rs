//! In-memory binding store.
//!
//! Backs integration tests and local development. Mirrors the semantics the
//! controller relies on from the real store: monotonically increasing
//! resource versions, compare-and-swap patches, generation bumps on spec
//! changes, and ordered watch fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use fleet_api::{Binding, BindingKey, BindingStatus, EvictionTask};
use futures_util::StreamExt;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::error::StoreError;
use crate::event::{BindingEvent, BindingEventStream};
use crate::store::BindingStore;

const WATCH_BUFFER: usize = 256;

/// In-memory [`BindingStore`].
pub struct MemoryStore {
    state: RwLock<HashMap<BindingKey, Binding>>,
    events: broadcast::Sender<BindingEvent>,
    writes: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            state: RwLock::new(HashMap::new()),
            events,
            writes: AtomicU64::new(0),
        }
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, HashMap<BindingKey, Binding>> {
        self.state.write().expect("memory store lock poisoned")
    }

    fn emit(&self, event: BindingEvent) {
        // No subscribers is fine; watch is fan-out, not a mailbox.
        let _ = self.events.send(event);
    }

    /// Create or replace a binding as a fresh object: resource version 1,
    /// generation at least 1. Emits `Created`.
    pub fn insert(&self, mut binding: Binding) -> Binding {
        binding.metadata.resource_version = 1;
        binding.metadata.generation = binding.metadata.generation.max(1);
        let stored = binding.clone();
        self.write_state().insert(binding.key(), binding);
        self.emit(BindingEvent::Created {
            binding: stored.clone(),
        });
        stored
    }

    /// Scheduler-style write: replace the whole object, bumping the resource
    /// version, and the generation too when the spec changed. Emits
    /// `Updated` (or `Created` for a new object).
    pub fn upsert(&self, mut binding: Binding) -> Binding {
        let key = binding.key();
        let mut state = self.write_state();
        match state.get(&key).cloned() {
            None => {
                drop(state);
                self.insert(binding)
            }
            Some(old) => {
                binding.metadata.resource_version = old.metadata.resource_version + 1;
                binding.metadata.generation = if binding.spec == old.spec {
                    old.metadata.generation
                } else {
                    old.metadata.generation + 1
                };
                let stored = binding.clone();
                state.insert(key, binding);
                self.emit(BindingEvent::Updated {
                    old: Some(old),
                    new: stored.clone(),
                });
                stored
            }
        }
    }

    /// Status-collector-style write: replace only the status, bumping the
    /// resource version but not the generation. Emits `Updated`.
    pub fn update_status(
        &self,
        key: &BindingKey,
        status: BindingStatus,
    ) -> Result<Binding, StoreError> {
        let mut state = self.write_state();
        let binding = state
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        let old = binding.clone();
        binding.status = status;
        binding.metadata.resource_version += 1;
        let stored = binding.clone();
        self.emit(BindingEvent::Updated {
            old: Some(old),
            new: stored.clone(),
        });
        Ok(stored)
    }

    /// Delete a binding. Emits `Deleted` if it existed.
    pub fn remove(&self, key: &BindingKey) -> Option<Binding> {
        let removed = self.write_state().remove(key);
        if let Some(binding) = &removed {
            self.emit(BindingEvent::Deleted {
                binding: binding.clone(),
            });
        }
        removed
    }

    /// Number of successful patch writes issued through [`BindingStore`].
    ///
    /// Lets tests assert the zero-writes-when-converged property.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BindingStore for MemoryStore {
    async fn get(&self, key: &BindingKey) -> Result<Binding, StoreError> {
        self.state
            .read()
            .expect("memory store lock poisoned")
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }

    async fn patch_eviction_tasks(
        &self,
        key: &BindingKey,
        expected_revision: u64,
        tasks: Vec<EvictionTask>,
    ) -> Result<Binding, StoreError> {
        let mut state = self.write_state();
        let binding = state
            .get_mut(key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if binding.metadata.resource_version != expected_revision {
            return Err(StoreError::Conflict {
                key: key.clone(),
                expected: expected_revision,
            });
        }

        let old = binding.clone();
        binding.spec.eviction_tasks = tasks;
        binding.metadata.resource_version += 1;
        // Trimming tasks is a spec change like any other.
        binding.metadata.generation += 1;
        let stored = binding.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.emit(BindingEvent::Updated {
            old: Some(old),
            new: stored.clone(),
        });
        Ok(stored)
    }

    async fn watch(&self) -> Result<BindingEventStream, StoreError> {
        let stream = BroadcastStream::new(self.events.subscribe()).filter_map(|item| async move {
            match item {
                Ok(event) => Some(Ok(event)),
                Err(BroadcastStreamRecvError::Lagged(missed)) => {
                    warn!(missed, "Watch subscriber lagged, dropping events");
                    None
                }
            }
        });
        Ok(stream.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(ns: &str, name: &str) -> Binding {
        let mut binding = Binding::default();
        binding.metadata.namespace = ns.to_string();
        binding.metadata.name = name.to_string();
        binding
    }

    fn task(cluster: &str) -> EvictionTask {
        EvictionTask {
            cluster_name: cluster.to_string(),
            created_at: Some(chrono::Utc::now()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_get_not_found() {
        let store = MemoryStore::new();
        let err = store.get(&BindingKey::new("prod", "web")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_patch_is_conditional() {
        let store = MemoryStore::new();
        let stored = store.insert(binding("prod", "web"));
        let key = stored.key();

        // Stale revision is rejected.
        let err = store
            .patch_eviction_tasks(&key, stored.metadata.resource_version + 1, vec![task("m1")])
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        // Current revision succeeds and bumps version and generation.
        let patched = store
            .patch_eviction_tasks(&key, stored.metadata.resource_version, vec![task("m1")])
            .await
            .unwrap();
        assert_eq!(
            patched.metadata.resource_version,
            stored.metadata.resource_version + 1
        );
        assert_eq!(patched.metadata.generation, stored.metadata.generation + 1);
        assert_eq!(patched.spec.eviction_tasks.len(), 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_upsert_bumps_generation_only_on_spec_change() {
        let store = MemoryStore::new();
        let stored = store.insert(binding("prod", "web"));

        // Status-only change through upsert keeps the generation.
        let mut status_change = stored.clone();
        status_change.status.scheduler_observed_generation = stored.metadata.generation;
        let updated = store.upsert(status_change);
        assert_eq!(updated.metadata.generation, stored.metadata.generation);

        // Spec change bumps it.
        let mut spec_change = updated.clone();
        spec_change.spec.eviction_tasks.push(task("m1"));
        let updated = store.upsert(spec_change);
        assert_eq!(updated.metadata.generation, stored.metadata.generation + 1);
    }

    #[tokio::test]
    async fn test_watch_sees_lifecycle() {
        let store = MemoryStore::new();
        let mut watch = store.watch().await.unwrap();

        let stored = store.insert(binding("prod", "web"));
        store
            .patch_eviction_tasks(&stored.key(), 1, vec![task("m1")])
            .await
            .unwrap();
        store.remove(&stored.key());

        match watch.next().await.unwrap().unwrap() {
            BindingEvent::Created { binding } => assert_eq!(binding.key(), stored.key()),
            other => panic!("expected created, got {other:?}"),
        }
        match watch.next().await.unwrap().unwrap() {
            BindingEvent::Updated { old, new } => {
                assert_eq!(old.unwrap().spec.eviction_tasks.len(), 0);
                assert_eq!(new.spec.eviction_tasks.len(), 1);
            }
            other => panic!("expected updated, got {other:?}"),
        }
        match watch.next().await.unwrap().unwrap() {
            BindingEvent::Deleted { binding } => assert_eq!(binding.key(), stored.key()),
            other => panic!("expected deleted, got {other:?}"),
        }
    }
}
