//! Upgrade scheduler
//!
//! Watches a state file of scheduled resources, announces and applies their
//! release upgrades at the requested time, and serves metrics over HTTP.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use upsched_schedule::Engine;
use upsched_scheduler::{
    clock::SystemClock, config::Config, events::TracingRecorder, http, metrics::UpgradeMetrics,
    store::FileStore, Reconciler, SchedulerWorker,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing (prefer RUST_LOG, fallback to UPSCHED_LOG_LEVEL)
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting upgrade scheduler");
    info!(
        state_file = %config.state_file.display(),
        listen_addr = %config.listen_addr,
        installation = %config.installation,
        "Configuration loaded"
    );

    let metrics = Arc::new(UpgradeMetrics::new());
    let reconciler = Arc::new(Reconciler::new(
        Arc::new(FileStore::new(&config.state_file)),
        Engine::new(config.engine_settings()),
        Arc::new(TracingRecorder),
        metrics.clone(),
        Arc::new(SystemClock),
    ));

    // Create shutdown channel for graceful shutdown
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = SchedulerWorker::new(reconciler, config.worker.clone());
    let worker_handle = tokio::spawn({
        let shutdown_rx = shutdown_rx.clone();
        async move {
            worker.run(shutdown_rx).await;
        }
    });

    let app = http::create_router(metrics);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!(addr = %config.listen_addr, "Listening for connections");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await
    });

    // Wait for shutdown signal (Ctrl+C)
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = server_handle => {
            match result {
                Ok(Ok(())) => info!("Server exited normally"),
                Ok(Err(e)) => error!(error = %e, "Server error"),
                Err(e) => error!(error = %e, "Server task panicked"),
            }
        }
    }

    // Signal shutdown to the worker
    let _ = shutdown_tx.send(true);

    if let Err(e) = tokio::time::timeout(Duration::from_secs(10), worker_handle).await {
        warn!(error = %e, "Scheduler worker did not shut down in time");
    }

    info!("Upgrade scheduler shutdown complete");
    Ok(())
}
