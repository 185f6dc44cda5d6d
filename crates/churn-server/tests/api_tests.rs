//! Integration tests for the prediction, health and metrics endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use churn_core::{
    artifacts::{ArtifactConfig, ArtifactSet},
    feature_column_names,
    health::{components, HealthRegistry},
    observability::{PipelineMetrics, StructuredLogger},
    predictor::{ChurnClassifier, LogisticClassifier, Predictor},
    ChurnPipeline, ColumnPolicy, PredictionCache, ScalingTransform,
};
use churn_server::api::{create_router, AppState};
use serde_json::{json, Value};
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// p = sigmoid(0.05 * download_avg - 2.5) with an identity scaler
fn test_model() -> Arc<dyn ChurnClassifier> {
    let mut coefficients = vec![0.0; 15];
    coefficients[3] = 0.05;
    Arc::new(LogisticClassifier::new("lr-test", feature_column_names(), coefficients, -2.5).unwrap())
}

fn test_artifacts() -> ArtifactSet {
    ArtifactSet::new(Some(ScalingTransform::identity("scaler-test")), Some(test_model()))
}

async fn setup_app(artifacts: ArtifactSet, csv_policy: ColumnPolicy, json_policy: ColumnPolicy) -> Router {
    let health_registry = HealthRegistry::new();
    health_registry.register(components::ARTIFACTS).await;
    health_registry.register(components::PREPROCESSOR).await;
    health_registry.register(components::PREDICTOR).await;
    health_registry.report_artifacts(&artifacts).await;

    let pipeline = ChurnPipeline::new(Predictor::default()).with_cache(PredictionCache::new(16));
    let state = AppState::new(
        health_registry,
        PipelineMetrics::new(),
        StructuredLogger::new("test-instance"),
        pipeline,
        artifacts,
    )
    .with_policies(csv_policy, json_policy);
    create_router(Arc::new(state))
}

fn record(id: &str, download: f64) -> Value {
    json!({
        "id": id,
        "is_tv_subscriber": 1,
        "is_movie_package_subscriber": 0,
        "subscription_age": 1.5,
        "reamining_contract": 0.4,
        "service_failure_count": 0,
        "download_avg": download,
        "upload_avg": 3.0,
        "download_over_limit": 0
    })
}

fn three_records() -> Value {
    json!({ "records": [record("a", 10.0), record("b", 50.0), record("c", 90.0)] })
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_csv(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/predict/csv")
        .header("content-type", "text/csv")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_predict_json_labels_risk() {
    let app = setup_app(test_artifacts(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (status, body) = send(app, post_json("/api/v1/predict", &three_records())).await;

    assert_eq!(status, StatusCode::OK);
    let predictions = body["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 3);
    assert_eq!(predictions[0]["id"], "a");
    assert_eq!(predictions[0]["risk_level"], "low");
    assert_eq!(predictions[1]["risk_level"], "medium");
    assert_eq!(predictions[2]["risk_level"], "high");
    let p = predictions[1]["probability"].as_f64().unwrap();
    assert!((p - 0.5).abs() < 1e-9);

    assert_eq!(body["summary"]["total"], 3);
    assert_eq!(body["summary"]["high"], 1);
    assert_eq!(body["model_version"], "lr-test");
    assert_eq!(body["scaler_version"], "scaler-test");
    assert_eq!(body["cached"], false);
}

#[tokio::test]
async fn test_repeated_batch_served_from_cache() {
    let app = setup_app(test_artifacts(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (_, first) = send(app.clone(), post_json("/api/v1/predict", &three_records())).await;
    let (status, second) = send(app, post_json("/api/v1/predict", &three_records())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["cached"], true);
    assert_eq!(first["predictions"], second["predictions"]);
}

#[tokio::test]
async fn test_strict_json_rejects_missing_column() {
    let mut partial = three_records();
    for r in partial["records"].as_array_mut().unwrap() {
        r.as_object_mut().unwrap().remove("upload_avg");
    }
    let app = setup_app(test_artifacts(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (status, body) = send(app, post_json("/api/v1/predict", &partial)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "missing_feature");
    assert!(body["message"].as_str().unwrap().contains("upload_avg"));
}

#[tokio::test]
async fn test_malformed_json_is_schema_error() {
    let app = setup_app(test_artifacts(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/predict")
        .body(Body::from("{\"records\": 5}"))
        .unwrap();
    let (status, body) = send(app, request).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "schema_error");
}

#[tokio::test]
async fn test_lenient_csv_fills_missing_column() {
    let csv = "id;is_tv_subscriber;is_movie_package_subscriber;subscription_age;remaining_contract;service_failure_count;download_avg;download_over_limit\n\
               7;1;0;2.0;0.1;0;10;0\n\
               8;0;1;0.5;;1;90;9\n";
    let app = setup_app(test_artifacts(), ColumnPolicy::Lenient, ColumnPolicy::Strict).await;
    let (status, body) = send(app, post_csv(csv)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["predictions"][0]["id"], "7");
    assert_eq!(body["predictions"][1]["id"], "8");
    let kinds: Vec<&str> = body["corrections"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["kind"].as_str().unwrap())
        .collect();
    assert!(kinds.contains(&"column_filled"));
    assert!(kinds.contains(&"over_limit_clipped"));
}

#[tokio::test]
async fn test_csv_non_numeric_cell_is_coercion_error() {
    let csv = "is_tv_subscriber,is_movie_package_subscriber,subscription_age,remaining_contract,service_failure_count,download_avg,upload_avg,download_over_limit\n\
               1,0,2.0,0.1,0,10,1,0\n\
               1,0,2.0,0.1,0,lots,1,0\n";
    let app = setup_app(test_artifacts(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (status, body) = send(app, post_csv(csv)).await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "coercion_error");
    assert!(body["message"].as_str().unwrap().contains("download_avg"));
}

#[tokio::test]
async fn test_predict_without_artifacts_is_unavailable() {
    let app = setup_app(ArtifactSet::default(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (status, body) = send(app, post_json("/api/v1/predict", &three_records())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "config_error");
}

#[tokio::test]
async fn test_predict_without_model_is_model_error() {
    let scaler_only = ArtifactSet::new(Some(ScalingTransform::identity("s")), None);
    let app = setup_app(scaler_only, ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (status, body) = send(app, post_json("/api/v1/predict", &three_records())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "model_error");
}

#[tokio::test]
async fn test_readiness_follows_artifacts() {
    let app = setup_app(test_artifacts(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (status, body) = send(app, get("/readyz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ready"], true);

    let app = setup_app(ArtifactSet::default(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    let (status, body) = send(app.clone(), get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["ready"], false);

    // Degraded still answers 200 on liveness
    let (status, body) = send(app, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_model_endpoint_reports_loaded_artifacts() {
    let dir = TempDir::new().unwrap();
    let names = feature_column_names();
    let manifest = json!({
        "version": "lr-2024-06",
        "feature_names": names,
        "kind": "logistic",
        "coefficients": vec![0.1; 15],
        "intercept": -1.0
    });
    let scaler = json!({
        "version": "scaler-2024-06",
        "columns": ["subscription_age", "reamining_contract", "service_failure_count", "download_avg", "upload_avg"],
        "mean": [2.4, 0.5, 0.3, 43.0, 4.2],
        "scale": [2.0, 0.6, 0.8, 60.0, 9.5]
    });
    let model_path = dir.path().join("model.json");
    let scaler_path = dir.path().join("scaler.json");
    fs::write(&model_path, manifest.to_string()).unwrap();
    fs::write(&scaler_path, scaler.to_string()).unwrap();

    let artifacts = ArtifactSet::load(&ArtifactConfig {
        model_path: Some(model_path),
        scaler_path: Some(scaler_path),
        ..ArtifactConfig::default()
    })
    .unwrap();
    let app = setup_app(artifacts, ColumnPolicy::Lenient, ColumnPolicy::Strict).await;
    let (status, body) = send(app, get("/api/v1/model")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["model_version"], "lr-2024-06");
    assert_eq!(body["scaler_version"], "scaler-2024-06");
    assert_eq!(body["model_kind"], "logistic");
    assert_eq!(body["feature_names"].as_array().unwrap().len(), 15);
    assert_eq!(body["csv_policy"], "lenient");
    assert_eq!(body["json_policy"], "strict");
    assert_eq!(body["low_risk_threshold"], 0.3);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = setup_app(test_artifacts(), ColumnPolicy::Strict, ColumnPolicy::Strict).await;
    send(app.clone(), post_json("/api/v1/predict", &three_records())).await;

    let response = app.oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("churn_rows_scored_total"));
    assert!(text.contains("churn_preprocess_latency_seconds"));
}
