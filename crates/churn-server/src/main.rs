//! Churn Server - subscriber churn prediction service
//!
//! Loads the scaling transform and model once at startup and serves
//! batch predictions over HTTP alongside health and metrics endpoints.

use anyhow::{Context, Result};
use churn_core::{
    artifacts::ArtifactSet,
    health::{components, HealthRegistry},
    observability::{PipelineMetrics, StructuredLogger},
};
use churn_server::{api, config::ServerConfig};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting churn-server");

    let config = ServerConfig::load()?;
    let thresholds = config.risk_thresholds()?;
    info!(instance = %config.instance_name, port = config.api_port, "Server configured");

    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACTS).await;
    health_registry.register(components::PREPROCESSOR).await;
    health_registry.register(components::PREDICTOR).await;

    let metrics = PipelineMetrics::new();
    let logger = StructuredLogger::new(&config.instance_name);

    // Artifact parsing and ONNX optimization are CPU-bound
    let artifact_config = config.artifact_config();
    let artifacts = tokio::task::spawn_blocking(move || ArtifactSet::load(&artifact_config))
        .await
        .context("Artifact loading task panicked")?;
    let artifacts = match artifacts {
        Ok(artifacts) => artifacts,
        Err(e) => {
            error!(error = %e, kind = e.kind(), "Failed to load artifacts");
            return Err(e).context("Failed to load artifacts");
        }
    };

    if let Some(version) = artifacts.scaler_version() {
        metrics.set_artifact_version("scaler", version);
    }
    if let Some(version) = artifacts.model_version() {
        metrics.set_artifact_version("model", version);
    }
    logger.log_artifacts_loaded(artifacts.scaler_version(), artifacts.model_version());
    health_registry.report_artifacts(&artifacts).await;

    let app_state = Arc::new(
        api::AppState::new(
            health_registry.clone(),
            metrics.clone(),
            logger.clone(),
            config.pipeline(),
            artifacts,
        )
        .with_thresholds(thresholds)
        .with_policies(config.csv_policy, config.json_policy),
    );

    logger.log_startup(SERVER_VERSION, config.api_port);

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server exited".to_string(),
                Ok(Err(e)) => format!("API server failed: {:#}", e),
                Err(e) => format!("API server task panicked: {}", e),
            };
            logger.log_shutdown(&reason);
            anyhow::bail!(reason);
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
