//! Watch/queue/worker wiring for the eviction controller.
//!
//! One watch task subscribes to binding change notifications, filters them
//! through the admission predicate, and enqueues keys. A bounded pool of
//! workers pulls keys and runs reconcile cycles; the queue guarantees at
//! most one in-flight cycle per binding. Delays requested by the controller
//! become timer entries in the queue, the worker is released immediately.

use std::sync::Arc;
use std::time::Duration;

use fleet_api::BindingKey;
use fleet_queue::{RateLimiter, RateLimiterOptions, WorkQueue};
use fleet_store::BindingStore;
use futures_util::StreamExt;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::controller::{EvictionController, ReconcileAction};
use crate::predicate::{admits, EventFilter, EVICTION_FILTERS};

/// Wait before re-opening a broken watch subscription.
const WATCH_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);

/// Runtime configuration.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of reconcile workers.
    pub workers: usize,

    /// Per-attempt deadline for one reconcile cycle, including its I/O.
    pub sync_timeout: Duration,

    /// Backoff parameters for failed cycles.
    pub limiter: RateLimiterOptions,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            sync_timeout: Duration::from_secs(30),
            limiter: RateLimiterOptions::default(),
        }
    }
}

/// Runs the eviction controller against a store.
pub struct ControllerRuntime {
    store: Arc<dyn BindingStore>,
    controller: Arc<EvictionController>,
    queue: WorkQueue<BindingKey>,
    limiter: Arc<RateLimiter<BindingKey>>,
    filters: &'static [EventFilter],
    config: RuntimeConfig,
}

impl ControllerRuntime {
    /// Create a runtime around a store and controller.
    pub fn new(
        store: Arc<dyn BindingStore>,
        controller: Arc<EvictionController>,
        config: RuntimeConfig,
    ) -> Self {
        Self {
            store,
            controller,
            queue: WorkQueue::new(),
            limiter: Arc::new(RateLimiter::new(config.limiter.clone())),
            filters: EVICTION_FILTERS,
            config,
        }
    }

    /// The shared work queue. Exposed so callers can nudge a binding without
    /// waiting for a watch notification (startup resync, tests).
    pub fn queue(&self) -> &WorkQueue<BindingKey> {
        &self.queue
    }

    /// Run until shutdown is signaled, then drain and stop.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            workers = self.config.workers,
            sync_timeout_secs = self.config.sync_timeout.as_secs(),
            "Starting eviction controller runtime"
        );

        let watch_task = tokio::spawn(watch_loop(
            Arc::clone(&self.store),
            self.queue.clone(),
            self.filters,
            shutdown.clone(),
        ));

        let mut workers = Vec::with_capacity(self.config.workers);
        for worker_id in 0..self.config.workers {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&self.controller),
                self.queue.clone(),
                Arc::clone(&self.limiter),
                self.config.sync_timeout,
            )));
        }

        // Wait for the shutdown signal, then let workers drain the queue.
        while !*shutdown.borrow() {
            if shutdown.changed().await.is_err() {
                break;
            }
        }
        info!("Shutting down eviction controller runtime");
        self.queue.shut_down();

        for handle in workers {
            let _ = handle.await;
        }
        let _ = watch_task.await;
        info!("Eviction controller runtime stopped");
    }
}

async fn watch_loop(
    store: Arc<dyn BindingStore>,
    queue: WorkQueue<BindingKey>,
    filters: &'static [EventFilter],
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            break;
        }

        let mut stream = match store.watch().await {
            Ok(stream) => stream,
            Err(err) => {
                warn!(error = %err, "Failed to open watch, retrying");
                tokio::select! {
                    _ = tokio::time::sleep(WATCH_RESUBSCRIBE_DELAY) => {}
                    _ = shutdown.changed() => {}
                }
                continue;
            }
        };

        loop {
            tokio::select! {
                item = stream.next() => match item {
                    Some(Ok(event)) => {
                        if admits(filters, &event) {
                            let key = event.key();
                            debug!(binding = %key, "Admitting change notification");
                            queue.add(key);
                        }
                    }
                    Some(Err(err)) => {
                        warn!(error = %err, "Watch stream error, re-subscribing");
                        break;
                    }
                    None => {
                        warn!("Watch stream ended, re-subscribing");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        debug!("Watch loop stopping");
                        return;
                    }
                }
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(WATCH_RESUBSCRIBE_DELAY) => {}
            _ = shutdown.changed() => {}
        }
    }
    debug!("Watch loop stopped");
}

async fn worker_loop(
    worker_id: usize,
    controller: Arc<EvictionController>,
    queue: WorkQueue<BindingKey>,
    limiter: Arc<RateLimiter<BindingKey>>,
    sync_timeout: Duration,
) {
    while let Some(key) = queue.get().await {
        match tokio::time::timeout(sync_timeout, controller.reconcile(&key)).await {
            Ok(Ok(ReconcileAction::Done)) => {
                limiter.forget(&key);
                queue.done(&key);
            }
            Ok(Ok(ReconcileAction::RequeueAfter(delay))) => {
                limiter.forget(&key);
                queue.done(&key);
                queue.add_after(key, delay);
            }
            Ok(Err(err)) => {
                let delay = limiter.next_delay(&key);
                warn!(
                    worker_id,
                    binding = %key,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Reconcile failed, requeueing"
                );
                queue.done(&key);
                queue.add_after(key, delay);
            }
            Err(_) => {
                let delay = limiter.next_delay(&key);
                warn!(
                    worker_id,
                    binding = %key,
                    timeout_secs = sync_timeout.as_secs(),
                    "Reconcile attempt timed out, requeueing"
                );
                queue.done(&key);
                queue.add_after(key, delay);
            }
        }
    }
    debug!(worker_id, "Worker stopped");
}
