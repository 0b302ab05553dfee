//! Per-key deduplicating work queue.

use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::Notify;

/// A work queue of keys with per-key deduplication.
///
/// Guarantees:
/// - A key present in the queue is not queued again.
/// - A key handed to a worker (between `get` and `done`) is not handed to
///   another worker; a re-add during processing is delivered once the worker
///   calls `done`.
/// - After `shut_down`, remaining items are still delivered, then `get`
///   returns `None`; new adds are dropped.
///
/// Cloning is cheap and clones share the same queue.
pub struct WorkQueue<K> {
    inner: Arc<Inner<K>>,
}

struct Inner<K> {
    state: Mutex<State<K>>,
    notify: Notify,
}

struct State<K> {
    /// Keys awaiting delivery, in arrival order.
    queue: VecDeque<K>,
    /// Keys that need processing: queued, or re-added while processing.
    dirty: HashSet<K>,
    /// Keys currently held by a worker.
    processing: HashSet<K>,
    shut_down: bool,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> Default for WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
{
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    shut_down: false,
                }),
                notify: Notify::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.inner.state.lock().expect("work queue mutex poisoned")
    }

    /// Add a key for processing. No-op if the key is already pending.
    pub fn add(&self, key: K) {
        let mut state = self.lock();
        if state.shut_down || state.dirty.contains(&key) {
            return;
        }
        state.dirty.insert(key.clone());
        if state.processing.contains(&key) {
            // Redelivered by `done` once the current attempt finishes.
            return;
        }
        state.queue.push_back(key);
        self.inner.notify.notify_one();
    }

    /// Add a key after `delay` elapses.
    ///
    /// The delay is a timer entry owned by the queue; the caller is released
    /// immediately. Delivery deduplicates like any other add. Must be called
    /// from within a tokio runtime.
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            self.add(key);
            return;
        }
        if self.lock().shut_down {
            return;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.add(key);
        });
    }

    /// Wait for the next key.
    ///
    /// Returns `None` once the queue has shut down and drained. The caller
    /// must call `done` with the returned key after processing it.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.inner.notify.notified();
            {
                let mut state = self.lock();
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    if !state.queue.is_empty() {
                        // Keep other waiters draining.
                        self.inner.notify.notify_one();
                    }
                    return Some(key);
                }
                if state.shut_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Mark a key as processed. If it was re-added meanwhile, queue it again.
    pub fn done(&self, key: &K) {
        let mut state = self.lock();
        state.processing.remove(key);
        if state.dirty.contains(key) && !state.queue.contains(key) {
            state.queue.push_back(key.clone());
            self.inner.notify.notify_one();
        }
    }

    /// Stop accepting new work and wake all waiters. Queued items are still
    /// delivered; once drained, `get` returns `None`.
    pub fn shut_down(&self) {
        self.lock().shut_down = true;
        self.inner.notify.notify_waiters();
    }

    /// Number of keys awaiting delivery.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Whether no keys await delivery.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_and_get() {
        let queue: WorkQueue<String> = WorkQueue::new();
        queue.add("a".to_string());
        queue.add("b".to_string());

        assert_eq!(queue.get().await, Some("a".to_string()));
        assert_eq!(queue.get().await, Some("b".to_string()));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pending_key_deduplicates() {
        let queue: WorkQueue<String> = WorkQueue::new();
        queue.add("a".to_string());
        queue.add("a".to_string());
        queue.add("a".to_string());

        assert_eq!(queue.get().await, Some("a".to_string()));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_readd_during_processing_redelivers_after_done() {
        let queue: WorkQueue<String> = WorkQueue::new();
        queue.add("a".to_string());

        let key = queue.get().await.unwrap();
        // Re-add while a worker holds the key: nothing is queued yet.
        queue.add("a".to_string());
        assert!(queue.is_empty());

        queue.done(&key);
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.get().await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_add_after_delivers() {
        let queue: WorkQueue<String> = WorkQueue::new();
        queue.add_after("a".to_string(), Duration::from_millis(20));
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(queue.get().await, Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_get_waits_for_add() {
        let queue: WorkQueue<String> = WorkQueue::new();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.add("a".to_string());

        let got = waiter.await.unwrap();
        assert_eq!(got, Some("a".to_string()));
    }

    #[tokio::test]
    async fn test_shutdown_drains_then_stops() {
        let queue: WorkQueue<String> = WorkQueue::new();
        queue.add("a".to_string());
        queue.shut_down();

        // Remaining work is still delivered.
        assert_eq!(queue.get().await, Some("a".to_string()));
        // New adds are dropped.
        queue.add("b".to_string());
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let queue: WorkQueue<String> = WorkQueue::new();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.get().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shut_down();

        assert_eq!(waiter.await.unwrap(), None);
    }
}
