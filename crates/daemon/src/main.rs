//! Workstation Advisor - right-sizing and idle control for cloud workstations
//!
//! This binary hosts the advisor engine behind an HTTP API and refreshes
//! every instance's recommendation on a fixed interval.

use advisor_lib::{
    health::HealthRegistry, AdvisorEngine, RefreshConfig, RefreshScheduler, SimulatedProvider,
    StructuredLogger, SystemClock,
};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use workstation_advisor::{api, config::DaemonConfig};

const ADVISOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting workstation-advisor");

    // Load configuration
    let config = DaemonConfig::load()?;
    info!(
        fleet = %config.fleet_name,
        api_port = config.api_port,
        refresh_interval_secs = config.refresh_interval_secs,
        "Advisor configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register_engine_components().await;

    // Build the engine
    let logger = StructuredLogger::new(&config.fleet_name);
    let provider = Arc::new(SimulatedProvider::new(config.simulated_latency()));
    let engine = Arc::new(
        AdvisorEngine::with_logger(
            config.engine.clone(),
            provider,
            Arc::new(SystemClock),
            logger.clone(),
        )?
        .with_health(health_registry.clone()),
    );
    logger.log_startup(ADVISOR_VERSION, engine.len());

    // Start the recommendation refresh loop
    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let scheduler = Arc::new(
        RefreshScheduler::new(
            engine.clone(),
            RefreshConfig {
                interval: config.refresh_interval(),
            },
        )
        .with_health(health_registry.clone()),
    );
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    // Create shared application state
    let app_state = Arc::new(api::AppState::new(engine.clone(), health_registry.clone()));

    // Mark advisor as ready after initialization
    health_registry.set_ready(true).await;

    // Start API server, stopping on the shutdown broadcast
    let mut api_shutdown = shutdown_tx.subscribe();
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, async move {
        let _ = api_shutdown.recv().await;
    }));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("SIGINT received, shutting down");
    health_registry.set_ready(false).await;
    let _ = shutdown_tx.send(());

    if let Err(e) = scheduler_handle.await {
        error!(error = %e, "Refresh scheduler task failed");
    }
    match api_handle.await {
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task failed"),
        Ok(Ok(())) => {}
    }
    engine.shutdown().await;

    Ok(())
}
