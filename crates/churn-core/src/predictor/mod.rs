//! Churn scoring
//!
//! A [`Predictor`] checks a preprocessed [`FeatureMatrix`] against the
//! feature names a [`ChurnClassifier`] was trained on, runs the classifier
//! (in parallel chunks for large batches) and validates that every output is
//! a probability.

mod batch;
mod forest;
mod inference;
mod logistic;
mod manifest;

pub use forest::{ForestClassifier, TreeNode};
pub use inference::OnnxClassifier;
pub use logistic::LogisticClassifier;
pub use manifest::{ModelKind, ModelManifest};

use crate::error::{ChurnError, Result};
use crate::models::FeatureMatrix;
use std::time::Instant;
use tracing::debug;

/// Default row count above which batches are scored in parallel chunks
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 1000;

/// Default rows per parallel chunk
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

/// A trained binary classifier producing positive-class (churn) probabilities
pub trait ChurnClassifier: Send + Sync {
    /// Feature columns the model was fit against, in order
    fn feature_names(&self) -> &[String];

    /// Opaque model version, used in cache keys and reported to clients
    fn version(&self) -> &str;

    /// Short model family name (`logistic`, `forest`, `onnx`)
    fn kind(&self) -> &'static str;

    /// One probability per row of `features`
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>>;
}

/// Stateless scorer
#[derive(Debug, Clone, Copy)]
pub struct Predictor {
    parallel_threshold: usize,
    chunk_size: usize,
}

impl Default for Predictor {
    fn default() -> Self {
        Self {
            parallel_threshold: DEFAULT_PARALLEL_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Predictor {
    pub fn new(parallel_threshold: usize, chunk_size: usize) -> Self {
        Self {
            parallel_threshold,
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn parallel_threshold(&self) -> usize {
        self.parallel_threshold
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Score every row of `features`.
    ///
    /// The column check runs before the model is invoked, so a mismatched
    /// matrix never reaches the classifier.
    pub fn score(&self, features: &FeatureMatrix, model: Option<&dyn ChurnClassifier>) -> Result<Vec<f64>> {
        let model = model.ok_or_else(|| ChurnError::Model("model is not loaded".to_string()))?;
        if features.is_empty() {
            return Err(ChurnError::Data("feature matrix has no rows".to_string()));
        }
        if features.columns() != model.feature_names() {
            return Err(ChurnError::SchemaMismatch {
                expected: model.feature_names().to_vec(),
                actual: features.columns().to_vec(),
            });
        }

        let start = Instant::now();
        let chunked = features.n_rows() > self.parallel_threshold;
        let probabilities = if chunked {
            batch::predict_chunked(model, features, self.chunk_size)?
        } else {
            model.predict_proba(features)?
        };

        validate_probabilities(&probabilities, features.n_rows())?;

        debug!(
            rows = features.n_rows(),
            chunked,
            model_version = %model.version(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Scored batch"
        );
        Ok(probabilities)
    }
}

fn validate_probabilities(probabilities: &[f64], expected: usize) -> Result<()> {
    if probabilities.len() != expected {
        return Err(ChurnError::Model(format!(
            "model returned {} probabilities for {} rows",
            probabilities.len(),
            expected
        )));
    }
    if let Some((row, p)) = probabilities
        .iter()
        .enumerate()
        .find(|(_, p)| !p.is_finite() || !(0.0..=1.0).contains(*p))
    {
        return Err(ChurnError::Model(format!(
            "model returned {} for row {}, expected a probability in [0, 1]",
            p,
            row + 1
        )));
    }
    Ok(())
}
