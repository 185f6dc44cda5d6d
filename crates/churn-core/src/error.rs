//! Error taxonomy for preprocessing and prediction
//!
//! Every failure of the core is surfaced to the caller as a [`ChurnError`];
//! nothing is retried internally. Value repairs (imputation, clamping) are
//! not errors and are reported as [`crate::preprocessor::Correction`]s.

use thiserror::Error;

/// Result alias used across the core crate
pub type Result<T> = std::result::Result<T, ChurnError>;

#[derive(Debug, Error)]
pub enum ChurnError {
    /// Empty or malformed input table
    #[error("schema error: {0}")]
    Schema(String),

    /// Required columns absent under the strict column policy
    #[error("missing required columns: {}", .columns.join(", "))]
    MissingFeature { columns: Vec<String> },

    /// Values present but unusable
    #[error("data error: {0}")]
    Data(String),

    /// Non-numeric value in a numeric column
    #[error("column '{column}' row {row}: cannot coerce {value:?} to a number")]
    Coercion {
        column: String,
        row: usize,
        value: String,
    },

    /// Missing or invalid scaling transform
    #[error("configuration error: {0}")]
    Config(String),

    /// Missing, invalid or misbehaving model
    #[error("model error: {0}")]
    Model(String),

    /// Feature matrix columns differ from the columns the model was trained on
    #[error(
        "feature schema mismatch: model expects [{}], got [{}]",
        .expected.join(", "),
        .actual.join(", ")
    )]
    SchemaMismatch {
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ChurnError {
    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            ChurnError::Schema(_) => "schema_error",
            ChurnError::MissingFeature { .. } => "missing_feature",
            ChurnError::Data(_) => "data_error",
            ChurnError::Coercion { .. } => "coercion_error",
            ChurnError::Config(_) => "config_error",
            ChurnError::Model(_) => "model_error",
            ChurnError::SchemaMismatch { .. } => "schema_mismatch",
            ChurnError::Io(_) => "io_error",
            ChurnError::Serialization(_) => "serialization_error",
        }
    }

    /// True when the error is caused by the submitted input rather than by
    /// the loaded artifacts or the environment
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ChurnError::Schema(_)
                | ChurnError::MissingFeature { .. }
                | ChurnError::Data(_)
                | ChurnError::Coercion { .. }
                | ChurnError::SchemaMismatch { .. }
        )
    }
}
