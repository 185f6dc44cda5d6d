//! ONNX inference using tract
//!
//! Runs an exported classifier graph row by row. The graph must take a
//! `[1, n_features]` f32 input; the first f32 output is read either as a
//! `[1, 2]` class-probability pair or as a single positive-class probability.

use super::ChurnClassifier;
use crate::error::{ChurnError, Result};
use crate::models::FeatureMatrix;
use std::time::Instant;
use tract_onnx::prelude::*;
use tracing::{debug, warn};

/// Per-row latency above which a warning is logged
const MAX_INFERENCE_MS: u128 = 5;

type TractModel = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// ONNX-based churn classifier
pub struct OnnxClassifier {
    model: TractModel,
    version: String,
    feature_names: Vec<String>,
}

impl std::fmt::Debug for OnnxClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxClassifier")
            .field("version", &self.version)
            .field("feature_names", &self.feature_names)
            .finish_non_exhaustive()
    }
}

impl OnnxClassifier {
    /// Parse and optimize an ONNX graph
    pub fn from_bytes(model_bytes: &[u8], version: impl Into<String>, feature_names: Vec<String>) -> Result<Self> {
        let model = Self::load_model(model_bytes, feature_names.len())?;
        Ok(Self {
            model,
            version: version.into(),
            feature_names,
        })
    }

    fn load_model(model_bytes: &[u8], n_features: usize) -> Result<TractModel> {
        let model_error = |stage: &str, e: TractError| ChurnError::Model(format!("{}: {}", stage, e));
        tract_onnx::onnx()
            .model_for_read(&mut std::io::Cursor::new(model_bytes))
            .map_err(|e| model_error("Failed to parse ONNX model", e))?
            .with_input_fact(0, f32::fact([1, n_features]).into())
            .map_err(|e| model_error("Failed to set input shape", e))?
            .into_optimized()
            .map_err(|e| model_error("Failed to optimize model", e))?
            .into_runnable()
            .map_err(|e| model_error("Failed to create runnable model", e))
    }

    fn row_to_tensor(row: &[f64]) -> Result<Tensor> {
        let data: Vec<f32> = row.iter().map(|v| *v as f32).collect();
        let array = tract_ndarray::Array2::from_shape_vec((1, row.len()), data)
            .map_err(|e| ChurnError::Model(format!("Failed to build input tensor: {}", e)))?;
        Ok(array.into())
    }

    /// Positive-class probability from the first f32 output
    fn read_probability(outputs: &TVec<TValue>) -> Result<f64> {
        let output = outputs
            .iter()
            .find(|t| t.datum_type() == f32::datum_type())
            .ok_or_else(|| ChurnError::Model("model produced no f32 output".to_string()))?;
        let view = output
            .to_array_view::<f32>()
            .map_err(|e| ChurnError::Model(format!("Unreadable model output: {}", e)))?;
        let values: Vec<f32> = view.iter().copied().collect();
        match values.as_slice() {
            [p] => Ok(*p as f64),
            [_, p] => Ok(*p as f64),
            other => Err(ChurnError::Model(format!(
                "model output has {} values, expected 1 or 2",
                other.len()
            ))),
        }
    }
}

impl ChurnClassifier for OnnxClassifier {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn kind(&self) -> &'static str {
        "onnx"
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        let mut probabilities = Vec::with_capacity(features.n_rows());
        for row in features.rows() {
            let start = Instant::now();
            let input = Self::row_to_tensor(row)?;
            let outputs = self
                .model
                .run(tvec!(input.into()))
                .map_err(|e| ChurnError::Model(format!("Inference failed: {}", e)))?;
            probabilities.push(Self::read_probability(&outputs)?);

            let elapsed = start.elapsed();
            if elapsed.as_millis() > MAX_INFERENCE_MS {
                warn!(elapsed_ms = elapsed.as_millis() as u64, "Inference exceeded {}ms target", MAX_INFERENCE_MS);
            }
        }
        debug!(rows = probabilities.len(), version = %self.version, "ONNX inference completed");
        Ok(probabilities)
    }
}
