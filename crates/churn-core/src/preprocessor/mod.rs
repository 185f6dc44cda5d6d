//! Feature preprocessing
//!
//! Turns a [`RawBatch`] into the fixed 15-column [`FeatureMatrix`] the
//! classifier was trained on:
//! 1. null-fill (`remaining_contract` with 0, traffic averages with the batch median)
//! 2. repair negative `subscription_age` with the median of the non-negative values
//! 3. clamp traffic averages to the batch IQR fences
//! 4. one-hot encode `download_over_limit` (truncated, clipped to 0..=7)
//! 5. standardize the continuous columns with the trainer's [`ScalingTransform`]
//!
//! Header normalization (including the `reamining_contract` alias) happens
//! when the batch is built, see [`crate::ingest`].

mod cleaning;
mod scaler;
mod stats;


pub use scaler::{ScalingParams, ScalingTransform, NUM_SCALED};
pub use stats::{clamp_outliers, iqr_bounds, median, quantile, ClampSummary, IQR_FENCE};

use crate::error::{ChurnError, Result};
use crate::models::{Column, FeatureMatrix, FeatureVector, RawBatch, NUM_FEATURES};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{debug, warn};

/// What to do when a required column is absent from the input table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnPolicy {
    /// Reject the batch with a missing-feature error
    #[default]
    Strict,
    /// Fill the column with zeros and record a correction
    Lenient,
}

impl ColumnPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnPolicy::Strict => "strict",
            ColumnPolicy::Lenient => "lenient",
        }
    }
}

impl std::str::FromStr for ColumnPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strict" => Ok(ColumnPolicy::Strict),
            "lenient" => Ok(ColumnPolicy::Lenient),
            other => Err(format!("unknown column policy '{}'", other)),
        }
    }
}

/// A value repair applied while cleaning a batch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Correction {
    /// Required column absent, filled for every row (lenient policy)
    ColumnFilled { column: Column, value: f64 },
    NullsFilled { column: Column, rows: usize, value: f64 },
    NegativesReplaced { column: Column, rows: usize, value: f64 },
    OutliersClamped { column: Column, rows: usize, lower: f64, upper: f64 },
    OverLimitClipped { rows: usize },
    IdsGenerated { rows: usize },
}

impl Correction {
    pub fn kind(&self) -> &'static str {
        match self {
            Correction::ColumnFilled { .. } => "column_filled",
            Correction::NullsFilled { .. } => "nulls_filled",
            Correction::NegativesReplaced { .. } => "negatives_replaced",
            Correction::OutliersClamped { .. } => "outliers_clamped",
            Correction::OverLimitClipped { .. } => "over_limit_clipped",
            Correction::IdsGenerated { .. } => "ids_generated",
        }
    }

    fn log(&self) {
        match self {
            Correction::ColumnFilled { column, value } => {
                warn!(column = %column, value, "Required column missing, filled with constant")
            }
            Correction::NullsFilled { column, rows, value } => {
                warn!(column = %column, rows, value, "Filled missing values")
            }
            Correction::NegativesReplaced { column, rows, value } => {
                warn!(column = %column, rows, value, "Replaced negative values with batch median")
            }
            Correction::OutliersClamped { column, rows, lower, upper } => {
                warn!(column = %column, rows, lower, upper, "Clamped outliers to IQR fences")
            }
            Correction::OverLimitClipped { rows } => {
                warn!(rows, "Clipped download_over_limit into 0..=7")
            }
            Correction::IdsGenerated { rows } => {
                warn!(rows, "ID column not found, generated sequential IDs")
            }
        }
    }
}

/// Output of [`Preprocessor::transform`]
#[derive(Debug, Clone, PartialEq)]
pub struct Preprocessed {
    pub features: FeatureMatrix,
    /// Row identifiers, aligned with `features`
    pub row_ids: Vec<String>,
    pub corrections: Vec<Correction>,
}

/// Stateless batch preprocessor configured with one column policy
#[derive(Debug, Clone, Copy, Default)]
pub struct Preprocessor {
    policy: ColumnPolicy,
}

impl Preprocessor {
    pub fn new(policy: ColumnPolicy) -> Self {
        Self { policy }
    }

    /// Clean, encode and scale a batch.
    ///
    /// # Errors
    /// * [`ChurnError::Schema`] if the batch has no rows
    /// * [`ChurnError::Config`] if no scaling transform is loaded
    /// * [`ChurnError::MissingFeature`] for absent columns under the strict policy
    /// * [`ChurnError::Coercion`] for non-numeric values in numeric columns
    /// * [`ChurnError::Data`] if `subscription_age` cannot be repaired
    pub fn transform(&self, batch: &RawBatch, scaler: Option<&ScalingTransform>) -> Result<Preprocessed> {
        let start = Instant::now();

        if batch.is_empty() {
            return Err(ChurnError::Schema("input table has no rows".to_string()));
        }
        let scaler = scaler
            .ok_or_else(|| ChurnError::Config("scaling transform is not loaded".to_string()))?;

        let mut corrections = Vec::new();
        let columns = cleaning::clean(batch, self.policy, &mut corrections)?;
        let row_ids = resolve_ids(batch, &mut corrections);

        let mut rows: Vec<FeatureVector> = Vec::with_capacity(batch.len());
        for i in 0..batch.len() {
            let scaled = scaler.transform_row(&[
                columns.subscription_age[i],
                columns.remaining_contract[i],
                columns.service_failure_count[i],
                columns.download_avg[i],
                columns.upload_avg[i],
            ]);
            let mut row = [0.0; NUM_FEATURES];
            row[..NUM_SCALED].copy_from_slice(&scaled);
            row[NUM_SCALED] = columns.is_tv_subscriber[i];
            row[NUM_SCALED + 1] = columns.is_movie_package_subscriber[i];
            row[NUM_SCALED + 2 + columns.download_over_limit[i]] = 1.0;

            if let Some(pos) = row.iter().position(|v| !v.is_finite()) {
                return Err(ChurnError::Data(format!(
                    "row {} produced a non-finite value in feature {}",
                    i + 1,
                    pos
                )));
            }
            rows.push(row);
        }

        for correction in &corrections {
            correction.log();
        }
        debug!(
            rows = rows.len(),
            policy = self.policy.as_str(),
            scaler_version = %scaler.version(),
            corrections = corrections.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Preprocessed batch"
        );

        Ok(Preprocessed {
            features: FeatureMatrix::from_vectors(rows),
            row_ids,
            corrections,
        })
    }
}

/// Original ids where present, otherwise the 1-based row number.
///
/// A generated id never repeats an id already in the batch; on collision the
/// next free number is used.
fn resolve_ids(batch: &RawBatch, corrections: &mut Vec<Correction>) -> Vec<String> {
    let has_ids = batch.has_column(Column::Id);
    let mut taken: HashSet<String> = if has_ids {
        batch.records().iter().filter_map(|r| r.id.clone()).collect()
    } else {
        HashSet::new()
    };
    let mut generated = 0;
    let ids = batch
        .records()
        .iter()
        .enumerate()
        .map(|(i, record)| match &record.id {
            Some(id) if has_ids => id.clone(),
            _ => {
                generated += 1;
                let mut n = i + 1;
                while taken.contains(&n.to_string()) {
                    n += 1;
                }
                let id = n.to_string();
                taken.insert(id.clone());
                id
            }
        })
        .collect();
    if generated > 0 {
        corrections.push(Correction::IdsGenerated { rows: generated });
    }
    ids
}
