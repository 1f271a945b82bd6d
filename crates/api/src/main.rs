use std::sync::Arc;

use anyhow::Context;

use pricepilot_api::app::{self, AppServices};
use pricepilot_infra::clock::SystemClock;
use pricepilot_infra::config::AppConfig;
use pricepilot_infra::marketplace::InMemoryMarketplace;
use pricepilot_infra::scheduler::{Scheduler, SchedulerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::load().context("failed to load configuration")?;
    pricepilot_observability::init(&cfg.logging);

    let tz = cfg.tz()?;
    // No live marketplace adapter is wired in this binary; mutations are recorded in memory.
    tracing::warn!("running against the in-memory marketplace");
    let services = AppServices::in_memory(&cfg, Arc::new(SystemClock::new(tz)), Arc::new(InMemoryMarketplace::new()));

    let scheduler = Scheduler::spawn(services.engine.clone(), SchedulerConfig::from_app(&cfg)?);
    let services = services.with_jobs(scheduler.triggers());

    let listener = tokio::net::TcpListener::bind(&cfg.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", cfg.server.bind))?;
    tracing::info!(addr = %listener.local_addr()?, timezone = %tz, "listening");

    axum::serve(listener, app::build_app(services))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    scheduler.shutdown().await;
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
