//! HTTP API for predictions, artifact info, health checks and Prometheus metrics

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use churn_core::{
    health::{ComponentStatus, HealthRegistry},
    ingest::{read_csv, records_to_batch},
    ArtifactInfo, ArtifactSet, ChurnError, ChurnPipeline, ColumnPolicy, Correction,
    PipelineMetrics, RawBatch, RiskSummary, RiskThresholds, ScoredPrediction, StructuredLogger,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// Largest accepted request body
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: PipelineMetrics,
    pub logger: StructuredLogger,
    pub pipeline: ChurnPipeline,
    pub artifacts: ArtifactSet,
    pub thresholds: RiskThresholds,
    pub csv_policy: ColumnPolicy,
    pub json_policy: ColumnPolicy,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: PipelineMetrics,
        logger: StructuredLogger,
        pipeline: ChurnPipeline,
        artifacts: ArtifactSet,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger,
            pipeline,
            artifacts,
            thresholds: RiskThresholds::default(),
            csv_policy: ColumnPolicy::default(),
            json_policy: ColumnPolicy::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: RiskThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_policies(mut self, csv_policy: ColumnPolicy, json_policy: ColumnPolicy) -> Self {
        self.csv_policy = csv_policy;
        self.json_policy = json_policy;
        self
    }
}

/// JSON prediction request
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub records: Vec<Map<String, Value>>,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<ScoredPrediction>,
    pub summary: RiskSummary,
    pub corrections: Vec<Correction>,
    pub scaler_version: String,
    pub model_version: String,
    pub cached: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelResponse {
    #[serde(flatten)]
    pub info: ArtifactInfo,
    pub low_risk_threshold: f64,
    pub high_risk_threshold: f64,
    pub csv_policy: ColumnPolicy,
    pub json_policy: ColumnPolicy,
}

/// Error response carrying the error kind and an HTTP status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    kind: &'static str,
    message: String,
}

impl ApiError {
    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            kind: "internal_error",
            message: message.into(),
        }
    }
}

impl From<ChurnError> for ApiError {
    fn from(e: ChurnError) -> Self {
        let status = if e.is_input_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            match &e {
                ChurnError::Config(_) | ChurnError::Model(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self {
            status,
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "error": self.kind, "message": self.message })),
        )
            .into_response()
    }
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still serves /model and /metrics
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse, ApiError> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelResponse> {
    Json(ModelResponse {
        info: state.artifacts.info(),
        low_risk_threshold: state.thresholds.low,
        high_risk_threshold: state.thresholds.high,
        csv_policy: state.csv_policy,
        json_policy: state.json_policy,
    })
}

/// Score JSON records: `{"records": [{...}, ...]}`
async fn predict_json(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictResponse>, ApiError> {
    let parsed = serde_json::from_slice::<PredictRequest>(&body)
        .map_err(|e| ChurnError::Schema(format!("invalid prediction request: {}", e)))
        .and_then(|request| records_to_batch(&request.records));
    let batch = match parsed {
        Ok(batch) => batch,
        Err(e) => return Err(reject(&state, "json", e)),
    };
    let policy = state.json_policy;
    score(state, "json", batch, policy).await
}

/// Score an uploaded CSV table
async fn predict_csv(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<PredictResponse>, ApiError> {
    let batch = match read_csv(&body) {
        Ok(batch) => batch,
        Err(e) => return Err(reject(&state, "csv", e)),
    };
    let policy = state.csv_policy;
    score(state, "csv", batch, policy).await
}

fn reject(state: &AppState, source: &str, e: ChurnError) -> ApiError {
    state.metrics.inc_error(e.kind());
    state.logger.log_prediction_failed(source, e.kind(), &e.to_string());
    e.into()
}

async fn score(
    state: Arc<AppState>,
    source: &'static str,
    batch: RawBatch,
    policy: ColumnPolicy,
) -> Result<Json<PredictResponse>, ApiError> {
    let start = Instant::now();
    let worker = Arc::clone(&state);
    let scored = tokio::task::spawn_blocking(move || {
        worker.pipeline.predict(&batch, policy, &worker.artifacts)
    })
    .await
    .map_err(|e| ApiError::internal(format!("prediction task failed: {}", e)))?;

    let scored = match scored {
        Ok(scored) => scored,
        Err(e) => {
            // The pipeline already counted the error
            state.logger.log_prediction_failed(source, e.kind(), &e.to_string());
            return Err(e.into());
        }
    };

    let output = &scored.output;
    state.logger.log_batch_scored(
        source,
        output.results.len(),
        output.corrections.len(),
        scored.cached,
        &output.model_version,
        start.elapsed().as_millis() as u64,
    );

    let predictions = state.thresholds.label(&output.results);
    Ok(Json(PredictResponse {
        summary: RiskSummary::from_predictions(&predictions),
        predictions,
        corrections: output.corrections.clone(),
        scaler_version: output.scaler_version.clone(),
        model_version: output.model_version.clone(),
        cached: scored.cached,
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/predict", post(predict_json))
        .route("/api/v1/predict/csv", post(predict_csv))
        .route("/api/v1/model", get(model_info))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
