//! Scoring against a running churn-server

use anyhow::{Context, Result};
use churn_core::ingest::InputFormat;
use colored::Colorize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::client::{ApiClient, ModelInfo, PredictionReport};
use crate::commands::predict::finish;
use crate::output::{OutputFormat, RiskFilter};

/// Upload a CSV or JSON file for scoring
pub async fn predict(
    client: &ApiClient,
    input: &Path,
    filter: Option<RiskFilter>,
    export: Option<PathBuf>,
    format: OutputFormat,
) -> Result<()> {
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;

    let report: PredictionReport = match InputFormat::from_path(input) {
        InputFormat::Csv => client.post_bytes("api/v1/predict/csv", bytes, "text/csv").await?,
        InputFormat::Json => {
            let body: Value = serde_json::from_slice(&bytes)
                .with_context(|| format!("{} is not valid JSON", input.display()))?;
            client.post("api/v1/predict", &json_request(body)).await?
        }
    };

    finish(&report, filter, export.as_deref(), format)
}

/// Accept either a bare array of records or a `{"records": [...]}` object
fn json_request(body: Value) -> Value {
    match body {
        Value::Array(records) => json!({ "records": records }),
        other => other,
    }
}

/// Show the artifacts the server has loaded
pub async fn model(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let info: ModelInfo = client.get("api/v1/model").await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&info)?);
        }
        OutputFormat::Table => {
            let artifacts = &info.artifacts;
            println!("{}", "Server Artifacts".bold());
            println!("{}", "=".repeat(50));
            println!("Scaler version:  {}", artifacts.scaler_version.as_deref().unwrap_or("-").cyan());
            println!("Model version:   {}", artifacts.model_version.as_deref().unwrap_or("-").cyan());
            println!("Model kind:      {}", artifacts.model_kind.as_deref().unwrap_or("-"));
            println!("Features:        {}", artifacts.feature_names.len());
            println!(
                "Risk thresholds: low > {:.2}, high > {:.2}",
                info.low_risk_threshold, info.high_risk_threshold
            );
            println!("CSV policy:      {}", info.csv_policy);
            println!("JSON policy:     {}", info.json_policy);
        }
    }

    Ok(())
}
