//! End-to-end scoring: raw batch -> preprocess -> predict -> results
//!
//! The pipeline holds no artifacts itself; callers pass the [`ArtifactSet`]
//! and the column policy of their entry point on every call.

use crate::artifacts::ArtifactSet;
use crate::cache::PredictionCache;
use crate::error::Result;
use crate::models::{PredictionResult, RawBatch};
use crate::observability::PipelineMetrics;
use crate::predictor::Predictor;
use crate::preprocessor::{ColumnPolicy, Correction, Preprocessor};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Results of one scored batch
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineOutput {
    /// One result per input row, in input order
    pub results: Vec<PredictionResult>,
    pub corrections: Vec<Correction>,
    pub scaler_version: String,
    pub model_version: String,
}

/// A pipeline output and whether it was served from the cache
#[derive(Debug, Clone)]
pub struct Scored {
    pub output: Arc<PipelineOutput>,
    pub cached: bool,
}

#[derive(Debug, Clone)]
pub struct ChurnPipeline {
    predictor: Predictor,
    cache: Option<Arc<PredictionCache>>,
    metrics: PipelineMetrics,
}

impl Default for ChurnPipeline {
    fn default() -> Self {
        Self::new(Predictor::default())
    }
}

impl ChurnPipeline {
    pub fn new(predictor: Predictor) -> Self {
        Self {
            predictor,
            cache: None,
            metrics: PipelineMetrics::new(),
        }
    }

    /// Memoize outputs; a zero-capacity cache is ignored
    pub fn with_cache(mut self, cache: PredictionCache) -> Self {
        self.cache = (cache.capacity() > 0).then(|| Arc::new(cache));
        self
    }

    pub fn cache(&self) -> Option<&PredictionCache> {
        self.cache.as_deref()
    }

    /// Score a batch.
    ///
    /// Error precedence follows the stages: input errors from preprocessing,
    /// then [`crate::ChurnError::Config`] for a missing scaler, then model
    /// errors from scoring.
    pub fn predict(&self, batch: &RawBatch, policy: ColumnPolicy, artifacts: &ArtifactSet) -> Result<Scored> {
        let result = self.predict_inner(batch, policy, artifacts);
        if let Err(e) = &result {
            self.metrics.inc_error(e.kind());
        }
        result
    }

    fn predict_inner(&self, batch: &RawBatch, policy: ColumnPolicy, artifacts: &ArtifactSet) -> Result<Scored> {
        let key = match (&self.cache, artifacts.scaler_version(), artifacts.model_version()) {
            (Some(_), Some(scaler), Some(model)) => Some(PredictionCache::fingerprint(batch, policy, scaler, model)?),
            _ => None,
        };
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(output) = cache.get(key) {
                self.metrics.inc_cache_hit();
                debug!(rows = output.results.len(), "Serving cached predictions");
                return Ok(Scored { output, cached: true });
            }
            self.metrics.inc_cache_miss();
        }

        let start = Instant::now();
        let preprocessed = Preprocessor::new(policy).transform(batch, artifacts.scaler())?;
        self.metrics.observe_preprocess_latency(start.elapsed().as_secs_f64());
        for correction in &preprocessed.corrections {
            self.metrics.inc_correction(correction.kind());
        }

        let start = Instant::now();
        let probabilities = self.predictor.score(&preprocessed.features, artifacts.model())?;
        self.metrics.observe_prediction_latency(start.elapsed().as_secs_f64());
        self.metrics.inc_batches_scored(probabilities.len());

        let results = preprocessed
            .row_ids
            .into_iter()
            .zip(probabilities)
            .map(|(id, probability)| PredictionResult { id, probability })
            .collect();
        let output = Arc::new(PipelineOutput {
            results,
            corrections: preprocessed.corrections,
            scaler_version: artifacts.scaler_version().unwrap_or_default().to_string(),
            model_version: artifacts.model_version().unwrap_or_default().to_string(),
        });

        if let (Some(cache), Some(key)) = (&self.cache, key) {
            cache.insert(key, Arc::clone(&output));
        }
        Ok(Scored { output, cached: false })
    }
}
