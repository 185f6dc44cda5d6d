//! Core library for subscriber churn prediction
//!
//! This crate provides:
//! - Ingestion of CSV and JSON subscriber tables
//! - Batch preprocessing into the fixed 15-column feature layout
//! - Scoring with logistic, tree-ensemble or ONNX classifiers
//! - Artifact loading, prediction caching, health checks and observability

pub mod artifacts;
pub mod cache;
pub mod error;
pub mod health;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod predictor;
pub mod preprocessor;

pub use artifacts::{ArtifactConfig, ArtifactInfo, ArtifactSet};
pub use cache::PredictionCache;
pub use error::{ChurnError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{PipelineMetrics, StructuredLogger};
pub use pipeline::{ChurnPipeline, PipelineOutput, Scored};
pub use predictor::{ChurnClassifier, Predictor};
pub use preprocessor::{ColumnPolicy, Correction, Preprocessed, Preprocessor, ScalingTransform};
