//! Local batch scoring

use anyhow::{Context, Result};
use churn_core::{
    ingest::read_file, ArtifactConfig, ArtifactSet, ChurnPipeline, ColumnPolicy, RiskSummary,
    RiskThresholds,
};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::client::PredictionReport;
use crate::output::{export_csv, print_report, print_success, OutputFormat, RiskFilter};

pub struct PredictOptions {
    pub input: PathBuf,
    pub artifacts: ArtifactConfig,
    pub policy: ColumnPolicy,
    pub thresholds: RiskThresholds,
    pub filter: Option<RiskFilter>,
    pub export: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Score a CSV or JSON file with locally loaded artifacts
pub fn score_file(
    input: &Path,
    config: &ArtifactConfig,
    policy: ColumnPolicy,
    thresholds: RiskThresholds,
) -> Result<PredictionReport> {
    if config.scaler_path.is_none() {
        anyhow::bail!("No scaler configured; pass --scaler or set scaler_path in the CLI config");
    }
    if config.model_path.is_none() {
        anyhow::bail!("No model configured; pass --model or set model_path in the CLI config");
    }
    let artifacts = ArtifactSet::load(config).context("Failed to load artifacts")?;
    let batch = read_file(input).with_context(|| format!("Failed to read {}", input.display()))?;
    debug!(rows = batch.len(), policy = policy.as_str(), "Scoring local batch");

    let scored = ChurnPipeline::default()
        .predict(&batch, policy, &artifacts)
        .context("Prediction failed")?;
    let output = scored.output;

    let predictions = thresholds.label(&output.results);
    let corrections = output
        .corrections
        .iter()
        .map(serde_json::to_value)
        .collect::<serde_json::Result<Vec<_>>>()?;
    Ok(PredictionReport {
        summary: RiskSummary::from_predictions(&predictions),
        predictions,
        corrections,
        scaler_version: output.scaler_version.clone(),
        model_version: output.model_version.clone(),
        cached: false,
    })
}

pub fn run(opts: PredictOptions) -> Result<()> {
    let report = score_file(&opts.input, &opts.artifacts, opts.policy, opts.thresholds)?;
    finish(&report, opts.filter, opts.export.as_deref(), opts.format)
}

/// Print a report and write the optional export, honoring the risk filter
pub fn finish(
    report: &PredictionReport,
    filter: Option<RiskFilter>,
    export: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    print_report(report, filter, format)?;
    if let Some(path) = export {
        let rows: Vec<_> = report
            .predictions
            .iter()
            .filter(|p| filter.map_or(true, |f| f.matches(p.risk_level)))
            .cloned()
            .collect();
        export_csv(path, &rows)?;
        if matches!(format, OutputFormat::Table) {
            print_success(&format!("Exported {} predictions to {}", rows.len(), path.display()));
        }
    }
    Ok(())
}
