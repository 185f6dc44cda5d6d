//! Artifact inspection

use anyhow::{Context, Result};
use churn_core::{
    artifacts::{compute_checksum, load_model, load_scaler},
    ArtifactConfig, ArtifactInfo, ArtifactSet,
};
use colored::Colorize;
use serde::Serialize;

use crate::output::{print_info, OutputFormat};

#[derive(Debug, Serialize)]
struct InspectReport {
    #[serde(flatten)]
    info: ArtifactInfo,
    scaler_sha256: Option<String>,
    model_sha256: Option<String>,
}

/// Load whichever artifacts are configured and describe them
pub fn run(config: &ArtifactConfig, format: OutputFormat) -> Result<()> {
    if config.scaler_path.is_none() && config.model_path.is_none() {
        anyhow::bail!("Nothing to inspect; pass --scaler and/or --model");
    }

    let scaler = config
        .scaler_path
        .as_deref()
        .map(|path| load_scaler(path, config.scaler_checksum.as_deref(), config.max_artifact_bytes))
        .transpose()
        .context("Failed to load scaler")?;
    let model = config
        .model_path
        .as_deref()
        .map(|path| load_model(path, config.max_artifact_bytes))
        .transpose()
        .context("Failed to load model")?;
    let artifacts = ArtifactSet::new(scaler, model);

    let checksum = |path: Option<&std::path::Path>| -> Result<Option<String>> {
        path.map(|p| {
            std::fs::read(p)
                .map(|bytes| compute_checksum(&bytes))
                .with_context(|| format!("Failed to read {}", p.display()))
        })
        .transpose()
    };
    let report = InspectReport {
        info: artifacts.info(),
        scaler_sha256: checksum(config.scaler_path.as_deref())?,
        model_sha256: checksum(config.model_path.as_deref())?,
    };

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Table => {
            let none = || "-".dimmed().to_string();
            println!("{}", "Artifacts".bold());
            println!("{}", "=".repeat(50));
            println!(
                "Scaler version:  {}",
                report.info.scaler_version.as_deref().map_or_else(none, |v| v.cyan().to_string())
            );
            if let Some(sha) = &report.scaler_sha256 {
                println!("Scaler sha256:   {}", sha);
            }
            println!(
                "Model version:   {}",
                report.info.model_version.as_deref().map_or_else(none, |v| v.cyan().to_string())
            );
            println!(
                "Model kind:      {}",
                report.info.model_kind.as_deref().unwrap_or("-")
            );
            if let Some(sha) = &report.model_sha256 {
                println!("Model sha256:    {}", sha);
            }

            if !report.info.feature_names.is_empty() {
                println!();
                println!("{}", "Features".bold());
                println!("{}", "-".repeat(50));
                for (i, name) in report.info.feature_names.iter().enumerate() {
                    println!("{:>3}  {}", i, name);
                }
            }
            if !artifacts.is_complete() {
                println!();
                print_info("Scoring needs both a scaler and a model");
            }
        }
    }

    Ok(())
}
