//! Service daemon: initializes the process context, runs the worker fleet
//! for every (kind × engine) queue, and shuts down gracefully on SIGINT.

use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use anycrawl::config::Settings;
use anycrawl::error::is_suppressible_network_fault;
use anycrawl::service::AppContext;

/// Expired-job sweep cadence.
const EVICTION_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env()?;
    info!(
        port = settings.api_port,
        redis = %settings.redis_url,
        min_concurrency = settings.min_concurrency,
        max_concurrency = settings.max_concurrency,
        "starting anycrawl"
    );

    let ctx = AppContext::initialize(settings).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let workers = ctx.spawn_workers(&shutdown_rx);
    info!(workers = workers.len(), "worker fleet running");

    // TTL sweep for expired jobs and artifact tokens.
    let sweep_ctx = std::sync::Arc::clone(&ctx);
    let mut sweep_shutdown = shutdown_rx.clone();
    let sweeper = tokio::spawn(async move {
        let mut tick = tokio::time::interval(EVICTION_INTERVAL);
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    match sweep_ctx.broker.evict_expired().await {
                        Ok(0) => {}
                        Ok(n) => info!(evicted = n, "expired jobs removed"),
                        Err(e) => {
                            let message = format!("{e:#}");
                            if is_suppressible_network_fault(&message) {
                                warn!("eviction sweep hit transient fault: {message}");
                            } else {
                                error!("eviction sweep failed: {message}");
                            }
                        }
                    }
                }
                _ = sweep_shutdown.changed() => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    ctx.shutdown(&shutdown_tx, workers).await;
    sweeper.abort();

    Ok(())
}
