//! Observability for the churn pipeline
//!
//! Provides:
//! - Prometheus metrics (preprocessing/prediction latency, rows scored, corrections, errors, cache)
//! - Structured logging of pipeline lifecycle events with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PipelineMetricsInner> = OnceLock::new();

struct PipelineMetricsInner {
    preprocess_latency_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    batches_scored: IntCounter,
    rows_scored: IntCounter,
    corrections: IntCounterVec,
    errors: IntCounterVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    artifact_version_info: GaugeVec,
    artifact_versions: Mutex<HashMap<String, String>>,
}

impl PipelineMetricsInner {
    fn new() -> Self {
        Self {
            preprocess_latency_seconds: register_histogram!(
                "churn_preprocess_latency_seconds",
                "Time spent cleaning, encoding and scaling a batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register preprocess_latency_seconds"),

            prediction_latency_seconds: register_histogram!(
                "churn_prediction_latency_seconds",
                "Time spent running the classifier on a batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            batches_scored: register_int_counter!(
                "churn_batches_scored_total",
                "Total number of batches scored"
            )
            .expect("Failed to register batches_scored"),

            rows_scored: register_int_counter!(
                "churn_rows_scored_total",
                "Total number of subscriber rows scored"
            )
            .expect("Failed to register rows_scored"),

            corrections: register_int_counter_vec!(
                "churn_corrections_total",
                "Value repairs applied during preprocessing",
                &["kind"]
            )
            .expect("Failed to register corrections"),

            errors: register_int_counter_vec!(
                "churn_errors_total",
                "Pipeline failures by error kind",
                &["kind"]
            )
            .expect("Failed to register errors"),

            cache_hits: register_int_counter!(
                "churn_cache_hits_total",
                "Prediction cache hits"
            )
            .expect("Failed to register cache_hits"),

            cache_misses: register_int_counter!(
                "churn_cache_misses_total",
                "Prediction cache misses"
            )
            .expect("Failed to register cache_misses"),

            artifact_version_info: register_gauge_vec!(
                "churn_artifact_version_info",
                "Versions of the loaded scaler and model",
                &["artifact", "version"]
            )
            .expect("Failed to register artifact_version_info"),

            artifact_versions: Mutex::new(HashMap::new()),
        }
    }
}

/// Pipeline metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct PipelineMetrics {
    _private: (),
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PipelineMetrics")
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PipelineMetricsInner {
        GLOBAL_METRICS.get_or_init(PipelineMetricsInner::new)
    }

    pub fn observe_preprocess_latency(&self, duration_secs: f64) {
        self.inner().preprocess_latency_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    /// Count one scored batch of `rows` rows
    pub fn inc_batches_scored(&self, rows: usize) {
        self.inner().batches_scored.inc();
        self.inner().rows_scored.inc_by(rows as u64);
    }

    pub fn inc_correction(&self, kind: &str) {
        self.inner().corrections.with_label_values(&[kind]).inc();
    }

    pub fn inc_error(&self, kind: &str) {
        self.inner().errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_cache_hit(&self) {
        self.inner().cache_hits.inc();
    }

    pub fn inc_cache_miss(&self) {
        self.inner().cache_misses.inc();
    }

    /// Publish the version of a loaded artifact (`scaler` or `model`)
    pub fn set_artifact_version(&self, artifact: &str, version: &str) {
        let inner = self.inner();
        if let Ok(mut current) = inner.artifact_versions.lock() {
            if let Some(old) = current.insert(artifact.to_string(), version.to_string()) {
                let _ = inner.artifact_version_info.remove_label_values(&[artifact, old.as_str()]);
            }
        }
        inner.artifact_version_info.with_label_values(&[artifact, version]).set(1.0);
    }

    pub fn rows_scored(&self) -> u64 {
        self.inner().rows_scored.get()
    }
}

/// Structured logger for pipeline events
///
/// Emits the same event names and fields from the server and the CLI so
/// log pipelines can key on `event`.
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn log_startup(&self, version: &str, port: u16) {
        info!(
            event = "server_started",
            instance = %self.instance,
            server_version = %version,
            port = port,
            "Churn prediction server started"
        );
    }

    pub fn log_artifacts_loaded(&self, scaler_version: Option<&str>, model_version: Option<&str>) {
        match (scaler_version, model_version) {
            (Some(scaler), Some(model)) => info!(
                event = "artifacts_loaded",
                instance = %self.instance,
                scaler_version = %scaler,
                model_version = %model,
                "Loaded scaler and model"
            ),
            _ => warn!(
                event = "artifacts_loaded",
                instance = %self.instance,
                scaler_version = ?scaler_version,
                model_version = ?model_version,
                "Artifacts incomplete, predictions will be rejected"
            ),
        }
    }

    pub fn log_batch_scored(
        &self,
        source: &str,
        rows: usize,
        corrections: usize,
        cached: bool,
        model_version: &str,
        elapsed_ms: u64,
    ) {
        info!(
            event = "batch_scored",
            instance = %self.instance,
            source = %source,
            rows = rows,
            corrections = corrections,
            cached = cached,
            model_version = %model_version,
            elapsed_ms = elapsed_ms,
            "Scored batch"
        );
    }

    pub fn log_prediction_failed(&self, source: &str, kind: &str, message: &str) {
        warn!(
            event = "prediction_failed",
            instance = %self.instance,
            source = %source,
            error_kind = %kind,
            message = %message,
            "Prediction request failed"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Churn prediction server shutting down"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_metrics_handles_share_state() {
        let metrics = PipelineMetrics::new();
        let before = metrics.rows_scored();
        metrics.observe_preprocess_latency(0.001);
        metrics.observe_prediction_latency(0.002);
        metrics.inc_correction("nulls_filled");
        metrics.inc_error("schema_error");
        PipelineMetrics::new().inc_batches_scored(3);
        assert!(metrics.rows_scored() >= before + 3);
    }

    #[test]
    fn test_artifact_version_replaces_previous() {
        let metrics = PipelineMetrics::new();
        metrics.set_artifact_version("test_artifact", "t1");
        metrics.set_artifact_version("test_artifact", "t2");
        let families = prometheus::gather();
        let family = families
            .iter()
            .find(|f| f.get_name() == "churn_artifact_version_info")
            .unwrap();
        let versions: Vec<&str> = family
            .get_metric()
            .iter()
            .filter(|m| {
                m.get_label()
                    .iter()
                    .any(|l| l.get_name() == "artifact" && l.get_value() == "test_artifact")
            })
            .flat_map(|m| m.get_label().iter())
            .filter(|l| l.get_name() == "version")
            .map(|l| l.get_value())
            .collect();
        assert_eq!(versions, vec!["t2"]);
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-instance");
        assert_eq!(logger.instance(), "test-instance");
    }
}
