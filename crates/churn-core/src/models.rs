//! Core data models for the churn pipeline

use crate::error::{ChurnError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Number of columns in every feature vector
pub const NUM_FEATURES: usize = 15;

/// Number of `download_over_limit` indicator columns (values 0..=7)
pub const OVER_LIMIT_LEVELS: usize = 8;

/// Columns standardized with the fitted scaling transform, in feature order
pub const SCALED_COLUMNS: [&str; 5] = [
    "subscription_age",
    "remaining_contract",
    "service_failure_count",
    "download_avg",
    "upload_avg",
];

/// Feature column order the classifier was fit against
pub const FEATURE_COLUMNS: [&str; NUM_FEATURES] = [
    "subscription_age",
    "remaining_contract",
    "service_failure_count",
    "download_avg",
    "upload_avg",
    "is_tv_subscriber",
    "is_movie_package_subscriber",
    "download_over_limit_0",
    "download_over_limit_1",
    "download_over_limit_2",
    "download_over_limit_3",
    "download_over_limit_4",
    "download_over_limit_5",
    "download_over_limit_6",
    "download_over_limit_7",
];

/// A single preprocessed row in [`FEATURE_COLUMNS`] order
pub type FeatureVector = [f64; NUM_FEATURES];

/// Owned copy of [`FEATURE_COLUMNS`]
pub fn feature_column_names() -> Vec<String> {
    FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect()
}

/// Known columns of the raw subscriber table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    Id,
    IsTvSubscriber,
    IsMoviePackageSubscriber,
    SubscriptionAge,
    RemainingContract,
    ServiceFailureCount,
    DownloadAvg,
    UploadAvg,
    DownloadOverLimit,
    /// Deprecated low-correlation feature, accepted and dropped
    BillAvg,
}

/// The eight columns every batch needs to produce a feature vector
pub const REQUIRED_COLUMNS: [Column; 8] = [
    Column::IsTvSubscriber,
    Column::IsMoviePackageSubscriber,
    Column::SubscriptionAge,
    Column::RemainingContract,
    Column::ServiceFailureCount,
    Column::DownloadAvg,
    Column::UploadAvg,
    Column::DownloadOverLimit,
];

/// Misspelled header still produced by older exports
pub const LEGACY_REMAINING_CONTRACT: &str = "reamining_contract";

impl Column {
    pub fn name(&self) -> &'static str {
        match self {
            Column::Id => "id",
            Column::IsTvSubscriber => "is_tv_subscriber",
            Column::IsMoviePackageSubscriber => "is_movie_package_subscriber",
            Column::SubscriptionAge => "subscription_age",
            Column::RemainingContract => "remaining_contract",
            Column::ServiceFailureCount => "service_failure_count",
            Column::DownloadAvg => "download_avg",
            Column::UploadAvg => "upload_avg",
            Column::DownloadOverLimit => "download_over_limit",
            Column::BillAvg => "bill_avg",
        }
    }

    /// Resolve a table header to a known column.
    ///
    /// Headers are trimmed and compared case-insensitively. The legacy
    /// `reamining_contract` spelling maps to [`Column::RemainingContract`] and
    /// `client_id` / `customer_id` map to [`Column::Id`].
    pub fn from_header(header: &str) -> Option<Column> {
        let normalized = header.trim().to_ascii_lowercase();
        let column = match normalized.as_str() {
            "id" | "client_id" | "customer_id" => Column::Id,
            "is_tv_subscriber" => Column::IsTvSubscriber,
            "is_movie_package_subscriber" => Column::IsMoviePackageSubscriber,
            "subscription_age" => Column::SubscriptionAge,
            "remaining_contract" | LEGACY_REMAINING_CONTRACT => Column::RemainingContract,
            "service_failure_count" => Column::ServiceFailureCount,
            "download_avg" => Column::DownloadAvg,
            "upload_avg" => Column::UploadAvg,
            "download_over_limit" => Column::DownloadOverLimit,
            "bill_avg" => Column::BillAvg,
            _ => return None,
        };
        Some(column)
    }

    /// True for a header spelled with the legacy alias
    pub fn is_legacy_alias(header: &str) -> bool {
        header.trim().eq_ignore_ascii_case(LEGACY_REMAINING_CONTRACT)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One raw table cell, kept untyped until coercion so bad values can be reported
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    #[default]
    Null,
    Number(f64),
    Text(String),
}

impl RawValue {
    /// Build a cell from a JSON value; booleans map to 1/0
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => RawValue::Null,
            serde_json::Value::Bool(b) => RawValue::Number(if *b { 1.0 } else { 0.0 }),
            serde_json::Value::Number(n) => n.as_f64().map(RawValue::Number).unwrap_or(RawValue::Null),
            serde_json::Value::String(s) => RawValue::Text(s.clone()),
            other => RawValue::Text(other.to_string()),
        }
    }

    /// Coerce to a number.
    ///
    /// `Ok(None)` means the cell is missing (null, blank, `NaN`, `NA` or a
    /// non-finite number). `Err` carries the offending text.
    pub fn to_number(&self) -> std::result::Result<Option<f64>, String> {
        match self {
            RawValue::Null => Ok(None),
            RawValue::Number(n) if n.is_finite() => Ok(Some(*n)),
            RawValue::Number(_) => Ok(None),
            RawValue::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty()
                    || ["nan", "na", "null", "none"]
                        .iter()
                        .any(|m| trimmed.eq_ignore_ascii_case(m))
                {
                    return Ok(None);
                }
                match trimmed.parse::<f64>() {
                    Ok(n) if n.is_finite() => Ok(Some(n)),
                    Ok(_) => Ok(None),
                    Err(_) => Err(s.clone()),
                }
            }
        }
    }

    /// Render as an identifier, `None` for empty cells
    pub fn as_id(&self) -> Option<String> {
        match self {
            RawValue::Null => None,
            RawValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Text(s) if s.trim().is_empty() => None,
            RawValue::Text(s) => Some(s.trim().to_string()),
        }
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// One subscriber row as received from a CSV upload or a form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub id: Option<String>,
    pub is_tv_subscriber: RawValue,
    pub is_movie_package_subscriber: RawValue,
    pub subscription_age: RawValue,
    pub remaining_contract: RawValue,
    pub service_failure_count: RawValue,
    pub download_avg: RawValue,
    pub upload_avg: RawValue,
    pub download_over_limit: RawValue,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter used by ingestion and tests
    pub fn with(mut self, column: Column, value: impl Into<RawValue>) -> Self {
        self.set(column, value.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Cell of a feature column; `None` for non-feature columns
    pub fn get(&self, column: Column) -> Option<&RawValue> {
        match column {
            Column::IsTvSubscriber => Some(&self.is_tv_subscriber),
            Column::IsMoviePackageSubscriber => Some(&self.is_movie_package_subscriber),
            Column::SubscriptionAge => Some(&self.subscription_age),
            Column::RemainingContract => Some(&self.remaining_contract),
            Column::ServiceFailureCount => Some(&self.service_failure_count),
            Column::DownloadAvg => Some(&self.download_avg),
            Column::UploadAvg => Some(&self.upload_avg),
            Column::DownloadOverLimit => Some(&self.download_over_limit),
            Column::Id | Column::BillAvg => None,
        }
    }

    /// Store a cell; the id column is rendered to text, `bill_avg` is discarded
    pub fn set(&mut self, column: Column, value: RawValue) {
        let slot = match column {
            Column::Id => {
                self.id = value.as_id();
                return;
            }
            Column::BillAvg => return,
            Column::IsTvSubscriber => &mut self.is_tv_subscriber,
            Column::IsMoviePackageSubscriber => &mut self.is_movie_package_subscriber,
            Column::SubscriptionAge => &mut self.subscription_age,
            Column::RemainingContract => &mut self.remaining_contract,
            Column::ServiceFailureCount => &mut self.service_failure_count,
            Column::DownloadAvg => &mut self.download_avg,
            Column::UploadAvg => &mut self.upload_avg,
            Column::DownloadOverLimit => &mut self.download_over_limit,
        };
        *slot = value;
    }
}

/// A raw table: which columns the source carried, plus its rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    columns: BTreeSet<Column>,
    records: Vec<RawRecord>,
}

impl RawBatch {
    pub fn new(columns: impl IntoIterator<Item = Column>, records: Vec<RawRecord>) -> Self {
        Self {
            columns: columns.into_iter().collect(),
            records,
        }
    }

    /// Batch whose source carried every required column and an id column
    pub fn with_all_columns(records: Vec<RawRecord>) -> Self {
        Self::new(
            REQUIRED_COLUMNS.iter().copied().chain(std::iter::once(Column::Id)),
            records,
        )
    }

    pub fn columns(&self) -> &BTreeSet<Column> {
        &self.columns
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    pub fn records(&self) -> &[RawRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Required columns absent from the source table, in schema order
    pub fn missing_required(&self) -> Vec<Column> {
        REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.columns.contains(c))
            .collect()
    }
}

/// Row-major numeric feature matrix with named columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    data: Vec<f64>,
    n_rows: usize,
}

impl FeatureMatrix {
    /// Build a matrix with arbitrary column names; every row must match the width
    pub fn new(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Result<Self> {
        let width = columns.len();
        let n_rows = rows.len();
        let mut data = Vec::with_capacity(n_rows * width);
        for (i, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(ChurnError::Data(format!(
                    "row {} has {} values, expected {}",
                    i,
                    row.len(),
                    width
                )));
            }
            data.extend(row);
        }
        Ok(Self { columns, data, n_rows })
    }

    /// Matrix in the standard [`FEATURE_COLUMNS`] layout
    pub fn from_vectors(rows: Vec<FeatureVector>) -> Self {
        let n_rows = rows.len();
        Self {
            columns: feature_column_names(),
            data: rows.into_iter().flatten().collect(),
            n_rows,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.n_rows == 0
    }

    pub fn row(&self, index: usize) -> &[f64] {
        let width = self.n_cols();
        &self.data[index * width..(index + 1) * width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows).map(move |i| self.row(i))
    }

    /// Flat row-major values
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Values of one named column
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.columns.iter().position(|c| c == name)?;
        Some(self.rows().map(|r| r[idx]).collect())
    }

    /// Split into consecutive sub-matrices of at most `size` rows
    pub fn chunks(&self, size: usize) -> Vec<FeatureMatrix> {
        let size = size.max(1);
        let width = self.n_cols();
        (0..self.n_rows)
            .step_by(size)
            .map(|start| {
                let end = (start + size).min(self.n_rows);
                FeatureMatrix {
                    columns: self.columns.clone(),
                    data: self.data[start * width..end * width].to_vec(),
                    n_rows: end - start,
                }
            })
            .collect()
    }
}

/// Churn probability for one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub id: String,
    pub probability: f64,
}

/// Coarse risk bucket used by result renderers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RiskLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            other => Err(format!("unknown risk level '{}'", other)),
        }
    }
}

/// Probability cut-offs: `p > high` is high risk, `p > low` is medium
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub low: f64,
    pub high: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self { low: 0.3, high: 0.7 }
    }
}

impl RiskThresholds {
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&low) || !(0.0..=1.0).contains(&high) || low > high {
            return Err(ChurnError::Config(format!(
                "invalid risk thresholds: low={} high={}",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    pub fn classify(&self, probability: f64) -> RiskLevel {
        if probability > self.high {
            RiskLevel::High
        } else if probability > self.low {
            RiskLevel::Medium
        } else {
            RiskLevel::Low
        }
    }
}

/// A prediction with its risk bucket, as returned to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPrediction {
    pub id: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
}

impl RiskThresholds {
    pub fn label(&self, results: &[PredictionResult]) -> Vec<ScoredPrediction> {
        results
            .iter()
            .map(|r| ScoredPrediction {
                id: r.id.clone(),
                probability: r.probability,
                risk_level: self.classify(r.probability),
            })
            .collect()
    }
}

/// Row counts per risk level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub total: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

impl RiskSummary {
    pub fn from_predictions(predictions: &[ScoredPrediction]) -> Self {
        let mut summary = Self::default();
        for p in predictions {
            summary.total += 1;
            match p.risk_level {
                RiskLevel::Low => summary.low += 1,
                RiskLevel::Medium => summary.medium += 1,
                RiskLevel::High => summary.high += 1,
            }
        }
        summary
    }
}
