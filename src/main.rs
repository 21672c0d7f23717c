//! Penguin Species Prediction Service - Main Entry Point
//!
//! Loads the classifier once, then serves predictions over HTTP until Ctrl+C.

use anyhow::{Context, Result};
use penguin_species_service::{
    config::{AppConfig, LoggingConfig},
    metrics::{MetricsReporter, ServingMetrics},
    models::inference::InferenceService,
    server::{self, AppState},
    FEATURE_NAMES,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_tracing(&config.logging)?;

    info!("Starting Penguin Species Prediction Service");
    info!(
        model = %config.model.model_path,
        classes = %config.model.classes_path,
        format = config.model.format.as_str(),
        "Configuration loaded successfully"
    );
    info!(features = ?FEATURE_NAMES, "Serving feature schema");

    // Load the artifact before accepting requests
    let service = Arc::new(InferenceService::start(&config.model));
    if !service.is_ready() {
        warn!("Model not loaded; /predict will answer 503 until the process is restarted");
    }

    let metrics = Arc::new(ServingMetrics::new());

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(metrics.clone(), config.metrics.report_interval_secs);
        tokio::spawn(reporter.start());
    }

    let app = server::router(AppState::new(service, metrics.clone()));

    let bind_addr = config.server.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!(address = %bind_addr, "Listening for prediction requests");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Service shutting down...");
    metrics.print_summary();

    Ok(())
}

/// RUST_LOG takes precedence over the configured level
fn init_tracing(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .context("Invalid log level")?;

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        _ => builder.init(),
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl+C; shutting down");
    }
}
