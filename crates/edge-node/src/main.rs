//! Edge node - solar panel soiling monitor and cleaning orchestrator
//!
//! Polls the soiling sensor, dispatches cleaning missions to the robot,
//! consults the dust forecast and periodically reports fleet analytics.

use anyhow::{Context, Result};
use edge_lib::{
    analytics::SimulatedBatchSource,
    forecast::create_forecast_source,
    health::HealthRegistry,
    mission::{MissionController, UdpTransport},
    observability::{EdgeMetrics, StructuredLogger},
    report::create_reporter,
    scheduler::CycleSchedulerBuilder,
    sensor::{RetryingSensor, SimulatedSensor},
    shutdown::{install_signal_handlers, ShutdownCoordinator},
};
use edge_node::{api, config::NodeConfig};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const NODE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting edge-node");

    let config = NodeConfig::load().context("Invalid configuration")?;
    info!(node_id = %config.node_id, robot = %config.robot_addr, "Node configured");

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    let metrics = EdgeMetrics::new();
    let logger = StructuredLogger::new(&config.node_id);

    let transport = UdpTransport::bind(config.local_addr(), config.robot_addr()?)
        .await
        .with_context(|| format!("Failed to bind robot link on {}", config.local_addr()))?;
    let controller = Arc::new(MissionController::new(
        Box::new(transport),
        config.mission_timeouts(),
    ));

    let sensor = Arc::new(RetryingSensor::new(
        Arc::new(SimulatedSensor::default()),
        config.retry_policy(),
    ));
    let forecast = create_forecast_source(config.forecast_config())?;
    let reporter = create_reporter(
        config.cloud_endpoint.as_deref(),
        Duration::from_secs(config.forecast_timeout_secs),
        config.retry_policy(),
    )?;
    logger.log_startup(NODE_VERSION, forecast.name(), reporter.name());

    let scheduler = CycleSchedulerBuilder::new()
        .config(config.scheduler_config())
        .sensor(sensor)
        .forecast(forecast)
        .controller(controller.clone())
        .analytics(config.analytics_config())
        .batches(Arc::new(SimulatedBatchSource::new(
            config.simulated_devices,
            config.simulated_batch_size,
        )))
        .advisor(config.scaling_advisor())
        .reporter(reporter)
        .health(health_registry.clone())
        .build()?;

    let shutdown = ShutdownCoordinator::new();
    let signals = install_signal_handlers(shutdown.clone());

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        logger.clone(),
        controller.clone(),
        config.api_token.clone(),
    ));
    let api_shutdown = {
        let shutdown = shutdown.clone();
        async move { shutdown.stopped().await }
    };
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state, api_shutdown));

    health_registry.set_ready(true).await;

    let cycles = scheduler.run(shutdown.clone()).await;
    logger.log_shutdown("Scheduler stopped");
    info!(cycles, "Orchestration loop finished");

    controller.shutdown().await;
    signals.abort();

    match api_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "API server failed"),
        Err(e) => error!(error = %e, "API server task aborted"),
    }

    info!("Node shutdown complete");
    Ok(())
}
