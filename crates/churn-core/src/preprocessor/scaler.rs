//! Fitted standardization for the scaled feature columns
//!
//! The transform is produced once by the trainer and loaded read-only at
//! inference time. The preprocessor only ever calls [`ScalingTransform::transform_row`];
//! [`ScalingTransform::fit`] exists for the training side.

use crate::error::{ChurnError, Result};
use crate::models::{Column, SCALED_COLUMNS};
use serde::{Deserialize, Serialize};

/// Number of standardized columns
pub const NUM_SCALED: usize = SCALED_COLUMNS.len();

/// On-disk form of a scaling transform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalingParams {
    pub version: String,
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

/// Per-column affine transform `z = (x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScalingParams", into = "ScalingParams")]
pub struct ScalingTransform {
    version: String,
    mean: [f64; NUM_SCALED],
    scale: [f64; NUM_SCALED],
}

impl ScalingTransform {
    pub fn new(
        version: impl Into<String>,
        mean: [f64; NUM_SCALED],
        scale: [f64; NUM_SCALED],
    ) -> Result<Self> {
        for (i, (m, s)) in mean.iter().zip(scale.iter()).enumerate() {
            if !m.is_finite() {
                return Err(ChurnError::Config(format!(
                    "scaler mean for '{}' is not finite",
                    SCALED_COLUMNS[i]
                )));
            }
            if !s.is_finite() || *s <= 0.0 {
                return Err(ChurnError::Config(format!(
                    "scaler scale for '{}' must be positive, got {}",
                    SCALED_COLUMNS[i], s
                )));
            }
        }
        Ok(Self {
            version: version.into(),
            mean,
            scale,
        })
    }

    /// Transform that leaves values unchanged
    pub fn identity(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            mean: [0.0; NUM_SCALED],
            scale: [1.0; NUM_SCALED],
        }
    }

    /// Fit on training rows laid out in [`SCALED_COLUMNS`] order.
    ///
    /// Uses the population standard deviation; zero-variance columns get a
    /// scale of 1 so they are only centered.
    pub fn fit(version: impl Into<String>, rows: &[[f64; NUM_SCALED]]) -> Result<Self> {
        if rows.is_empty() {
            return Err(ChurnError::Data(
                "cannot fit scaling transform on empty data".to_string(),
            ));
        }
        let n = rows.len() as f64;
        let mut mean = [0.0; NUM_SCALED];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row) {
                *m += v / n;
            }
        }
        let mut scale = [0.0; NUM_SCALED];
        for row in rows {
            for ((s, v), m) in scale.iter_mut().zip(row).zip(&mean) {
                *s += (v - m).powi(2) / n;
            }
        }
        for s in scale.iter_mut() {
            *s = s.sqrt();
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }
        Self::new(version, mean, scale)
    }

    /// Parse a JSON artifact, reporting invalid parameters as configuration errors
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let params: ScalingParams = serde_json::from_slice(bytes)?;
        Self::try_from(params)
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn mean(&self) -> &[f64; NUM_SCALED] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; NUM_SCALED] {
        &self.scale
    }

    pub fn transform_row(&self, values: &[f64; NUM_SCALED]) -> [f64; NUM_SCALED] {
        let mut out = [0.0; NUM_SCALED];
        for i in 0..NUM_SCALED {
            out[i] = (values[i] - self.mean[i]) / self.scale[i];
        }
        out
    }
}

impl TryFrom<ScalingParams> for ScalingTransform {
    type Error = ChurnError;

    fn try_from(params: ScalingParams) -> Result<Self> {
        // Older artifacts were fit against the misspelled contract column.
        let resolved: Vec<Option<Column>> =
            params.columns.iter().map(|c| Column::from_header(c)).collect();
        let expected: Vec<Option<Column>> =
            SCALED_COLUMNS.iter().map(|c| Column::from_header(c)).collect();
        if resolved != expected {
            return Err(ChurnError::Config(format!(
                "scaler columns [{}] do not match [{}]",
                params.columns.join(", "),
                SCALED_COLUMNS.join(", ")
            )));
        }
        let mean: [f64; NUM_SCALED] = params.mean.as_slice().try_into().map_err(|_| {
            ChurnError::Config(format!(
                "scaler has {} means, expected {}",
                params.mean.len(),
                NUM_SCALED
            ))
        })?;
        let scale: [f64; NUM_SCALED] = params.scale.as_slice().try_into().map_err(|_| {
            ChurnError::Config(format!(
                "scaler has {} scales, expected {}",
                params.scale.len(),
                NUM_SCALED
            ))
        })?;
        Self::new(params.version, mean, scale)
    }
}

impl From<ScalingTransform> for ScalingParams {
    fn from(transform: ScalingTransform) -> Self {
        Self {
            version: transform.version,
            columns: SCALED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            mean: transform.mean.to_vec(),
            scale: transform.scale.to_vec(),
        }
    }
}
