//! Parallel chunked scoring for large batches

use super::ChurnClassifier;
use crate::error::Result;
use crate::models::FeatureMatrix;
use rayon::prelude::*;
use tracing::debug;

/// Score `features` in chunks of `chunk_size` rows on the rayon pool.
///
/// Chunks are concatenated back in row order. Batch statistics were already
/// computed over the full batch, so the split does not change any value.
pub(crate) fn predict_chunked(
    model: &dyn ChurnClassifier,
    features: &FeatureMatrix,
    chunk_size: usize,
) -> Result<Vec<f64>> {
    let chunks = features.chunks(chunk_size);
    debug!(
        rows = features.n_rows(),
        chunks = chunks.len(),
        chunk_size,
        "Scoring batch in parallel chunks"
    );

    let scored: Vec<Vec<f64>> = chunks
        .par_iter()
        .map(|chunk| model.predict_proba(chunk))
        .collect::<Result<_>>()?;

    Ok(scored.into_iter().flatten().collect())
}
