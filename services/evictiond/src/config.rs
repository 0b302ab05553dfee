//! Configuration for the eviction controller.

use std::time::Duration;

use anyhow::Result;
use fleet_queue::RateLimiterOptions;

/// Eviction controller configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Placement API URL.
    pub api_url: String,

    /// Global grace timeout: the longest any eviction task stays pending
    /// without confirmation.
    pub eviction_timeout: Duration,

    /// Number of reconcile workers.
    pub workers: usize,

    /// Per-attempt deadline for one reconcile cycle.
    pub sync_timeout: Duration,

    /// Retry backoff parameters.
    pub limiter: RateLimiterOptions,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("FLEET_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string());

        let eviction_timeout_secs = std::env::var("FLEET_EVICTION_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(600);

        let workers = std::env::var("FLEET_WORKERS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2);

        let sync_timeout_secs = std::env::var("FLEET_SYNC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        let base_delay_ms = std::env::var("FLEET_RETRY_BASE_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let max_delay_secs = std::env::var("FLEET_RETRY_MAX_DELAY_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1000);

        let factor = std::env::var("FLEET_RETRY_FACTOR")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2.0);

        let log_level = std::env::var("FLEET_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_url,
            eviction_timeout: Duration::from_secs(eviction_timeout_secs),
            workers,
            sync_timeout: Duration::from_secs(sync_timeout_secs),
            limiter: RateLimiterOptions {
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: Duration::from_secs(max_delay_secs),
                factor,
            },
            log_level,
        })
    }
}
