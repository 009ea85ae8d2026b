//! Device sentinel agent
//!
//! Polls one network device at a fixed cadence, keeps a rolling series of
//! derived health samples and serves them over HTTP.

use anyhow::Result;
use sentinel_lib::{
    api::{self, AppState},
    create_source,
    health::{components, HealthRegistry},
    observability::{SentinelMetrics, StructuredLogger},
    presenter::{run_presenter, LogPresenter},
    ConnectionControl, ConnectionState, PollingSchedulerBuilder, SeriesStore,
};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting sentinel-agent");

    let config = config::AgentConfig::load()?;
    info!(
        device = %config.device.endpoint(),
        source = ?config.source.kind,
        "Agent configured"
    );

    // Initialize health registry
    let health_registry = HealthRegistry::new();
    health_registry.register(components::SAMPLER).await;
    health_registry.register(components::SOURCE).await;
    health_registry.register(components::STORE).await;

    let metrics = SentinelMetrics::new();
    metrics.set_device(&config.device);

    let logger = StructuredLogger::new(config.device.endpoint());
    logger.log_startup(AGENT_VERSION, config.polling.interval_ms, config.store.capacity);

    let source = match create_source(&config.source, &config.device) {
        Ok(source) => source,
        Err(e) => {
            health_registry
                .set_unhealthy(components::SOURCE, e.to_string())
                .await;
            return Err(e);
        }
    };
    let store = SeriesStore::new(config.store.capacity);

    let connection = ConnectionControl::default();
    metrics.set_connection_state(ConnectionState::Disconnected);

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let scheduler_config = config.scheduler_config();
    let scheduler = PollingSchedulerBuilder::new()
        .source(source)
        .store(store.clone())
        .connection(connection.subscribe())
        .health(health_registry.clone())
        .metrics(metrics.clone())
        .logger(logger.clone())
        .interval(scheduler_config.interval)
        .fetch_timeout(scheduler_config.fetch_timeout)
        .unhealthy_after_failures(scheduler_config.unhealthy_after_failures)
        .build()?;
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_tx.subscribe()));

    let presenter = LogPresenter::new(logger.clone());
    let presenter_store = store.clone();
    let presenter_shutdown = shutdown_tx.subscribe();
    let presenter_handle = tokio::spawn(async move {
        run_presenter(&presenter_store, presenter, presenter_shutdown).await
    });

    let app_state = Arc::new(AppState::new(
        health_registry.clone(),
        metrics.clone(),
        store.clone(),
        connection.clone(),
        config.device.clone(),
    ));

    if config.auto_connect {
        let state = connection.connect_to(&config.device);
        info!(state = ?state, "Auto-connect applied");
    }

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    // Start health, metrics and series server
    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let reason = tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            "SIGINT received"
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => "API server stopped",
                Ok(Err(e)) => {
                    error!(error = %e, "API server failed");
                    "API server failed"
                }
                Err(e) => {
                    error!(error = %e, "API server task panicked");
                    "API server task panicked"
                }
            }
        }
    };

    logger.log_shutdown(reason);
    health_registry.set_ready(false).await;
    connection.disconnect();
    let _ = shutdown_tx.send(());

    let stats = scheduler_handle.await?;
    let presenter = presenter_handle.await?;
    api_handle.abort();

    info!(
        cycles = stats.cycles,
        recorded = stats.recorded,
        failed = stats.failed,
        presented = presenter.presented(),
        retained = store.len().await,
        "Shutdown complete"
    );

    Ok(())
}
