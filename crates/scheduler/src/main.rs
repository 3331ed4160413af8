//! PSO Scheduler - batch pod placement across regions
//!
//! Watches for unscheduled pods that request this scheduler, buffers them,
//! and on every tick places the whole batch using a particle swarm search
//! over region latency and node load telemetry.

use anyhow::{Context, Result};
use scheduler_lib::{
    dispatch::KubeBinder,
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    scheduler::BatchSchedulerBuilder,
    telemetry::DatadogMetricsSource,
    watch::PodWatcher,
    PodBuffer,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SCHEDULER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting pso-scheduler");

    let config = config::SchedulerConfig::load()?;
    let logger = StructuredLogger::new(&config.scheduler_name);
    logger.log_startup(SCHEDULER_VERSION, &config);

    let health_registry = HealthRegistry::new();
    health_registry.register(components::WATCHER).await;
    health_registry.register(components::SCHEDULER).await;
    health_registry.register(components::TELEMETRY).await;
    health_registry.register(components::DISPATCHER).await;

    // Without cluster access there is nothing to schedule
    let client = kube::Client::try_default()
        .await
        .context("Failed to connect to the Kubernetes API")?;
    info!("Connected to Kubernetes API");

    let buffer = Arc::new(PodBuffer::new(config.scheduler_name.clone()));

    let source = DatadogMetricsSource::new(client.clone(), &config.metrics_namespace)
        .with_health(health_registry.clone());

    let scheduler = BatchSchedulerBuilder::new()
        .buffer(buffer.clone())
        .metrics_source(Arc::new(source))
        .binder(Arc::new(KubeBinder::new(client.clone())))
        .health(health_registry.clone())
        .tick_interval(config.tick_interval())
        .buffer_high_water(config.buffer_high_water)
        .optimizer(config.optimizer)
        .build()?;

    let watcher = PodWatcher::new(
        client,
        &config.watch_namespace,
        buffer.clone(),
        health_registry.clone(),
    );

    let (shutdown_tx, _) = broadcast::channel(1);
    let watch_handle = tokio::spawn(watcher.run(shutdown_tx.subscribe()));
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        buffer,
        config.optimizer,
    ));

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    if shutdown_tx.send(()).is_err() {
        warn!("Background tasks already stopped");
    }

    let (watch_result, scheduler_result) = tokio::join!(watch_handle, scheduler_handle);
    if let Err(e) = watch_result {
        warn!(error = %e, "Pod watcher task failed");
    }
    if let Err(e) = scheduler_result {
        warn!(error = %e, "Scheduler task failed");
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
