//! fleet-mc Eviction Controller
//!
//! `evictiond` watches bindings for pending eviction tasks and retires each
//! task once the workload is confirmed running elsewhere, or unconditionally
//! once its grace window expires.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use fleet_evictiond::config::Config;
use fleet_evictiond::runtime::RuntimeConfig;
use fleet_evictiond::{ControllerRuntime, EvictionController, TracingRecorder};
use fleet_store::HttpBindingStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting fleet-mc eviction controller");

    // Load configuration
    let config = Config::from_env()?;
    info!(
        api_url = %config.api_url,
        eviction_timeout_secs = config.eviction_timeout.as_secs(),
        workers = config.workers,
        "Configuration loaded"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let store = Arc::new(
        HttpBindingStore::new(config.api_url.clone())?.with_request_timeout(config.sync_timeout),
    );
    let controller = Arc::new(EvictionController::new(
        store.clone(),
        Arc::new(TracingRecorder),
        config.eviction_timeout,
    ));
    let runtime = ControllerRuntime::new(
        store,
        controller,
        RuntimeConfig {
            workers: config.workers,
            sync_timeout: config.sync_timeout,
            limiter: config.limiter.clone(),
        },
    );

    let runtime_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            runtime.run(shutdown_rx).await;
        }
    });

    // Wait for shutdown signal
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        _ = runtime_handle => {
            info!("Runtime exited");
        }
    }

    // Signal shutdown and give workers time to drain
    let _ = shutdown_tx.send(true);
    info!("Waiting for workers to shut down...");
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;

    info!("Eviction controller shutdown complete");
    Ok(())
}
