//! Per-key exponential backoff.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// Rate limiter parameters. Injected at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct RateLimiterOptions {
    /// Delay for the first retry of a key.
    pub base_delay: Duration,

    /// Upper bound on any computed delay.
    pub max_delay: Duration,

    /// Multiplier applied per consecutive failure.
    pub factor: f64,
}

impl Default for RateLimiterOptions {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_secs(1000),
            factor: 2.0,
        }
    }
}

/// Per-key exponential failure backoff.
///
/// Each call to `next_delay` for a key grows its delay by `factor`, capped at
/// `max_delay`; `forget` resets the key after a successful attempt.
pub struct RateLimiter<K> {
    options: RateLimiterOptions,
    failures: Mutex<HashMap<K, u32>>,
}

impl<K> RateLimiter<K>
where
    K: Clone + Eq + Hash,
{
    /// Create a limiter with the given options.
    pub fn new(options: RateLimiterOptions) -> Self {
        Self {
            options,
            failures: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<K, u32>> {
        self.failures.lock().expect("rate limiter mutex poisoned")
    }

    /// Delay before the next retry of `key`, recording one more failure.
    pub fn next_delay(&self, key: &K) -> Duration {
        let mut failures = self.lock();
        let count = failures.entry(key.clone()).or_insert(0);
        let exponent = *count;
        *count = count.saturating_add(1);

        // Exponent capped so the f64 math cannot overflow to infinity.
        let delay =
            self.options.base_delay.as_secs_f64() * self.options.factor.powi(exponent.min(64) as i32);
        if !delay.is_finite() || delay >= self.options.max_delay.as_secs_f64() {
            self.options.max_delay
        } else {
            Duration::from_secs_f64(delay)
        }
    }

    /// Consecutive failures recorded for `key`.
    pub fn num_failures(&self, key: &K) -> u32 {
        self.lock().get(key).copied().unwrap_or(0)
    }

    /// Reset backoff for `key` after a successful attempt.
    pub fn forget(&self, key: &K) {
        self.lock().remove(key);
    }
}
