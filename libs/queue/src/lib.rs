//! # fleet-queue
//!
//! Work-queue primitives for watch-driven controllers.
//!
//! - **Per-key deduplication**: a key that is queued or being processed is
//!   never queued twice; a key re-added mid-processing is redelivered after
//!   the current attempt completes. This is the sole concurrency-safety
//!   mechanism controllers rely on for object mutation.
//! - **Delayed re-enqueue**: `add_after` registers a timer entry owned by the
//!   queue; no worker sleeps on a delay.
//! - **Rate limiting**: per-key exponential backoff with injected options,
//!   read-only after startup.

mod limiter;
mod queue;

pub use limiter::{RateLimiter, RateLimiterOptions};
pub use queue::WorkQueue;
