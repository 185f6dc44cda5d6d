//! Output formatting utilities

use anyhow::{Context, Result};
use churn_core::{RiskLevel, ScoredPrediction};
use clap::ValueEnum;
use colored::Colorize;
use serde_json::Value;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

use crate::client::PredictionReport;

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Risk level accepted by `--risk`
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RiskFilter {
    Low,
    Medium,
    High,
}

impl RiskFilter {
    pub fn matches(self, level: RiskLevel) -> bool {
        matches!(
            (self, level),
            (RiskFilter::Low, RiskLevel::Low)
                | (RiskFilter::Medium, RiskLevel::Medium)
                | (RiskFilter::High, RiskLevel::High)
        )
    }
}

/// Row for predictions table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Churn Probability")]
    probability: String,
    #[tabled(rename = "Risk")]
    risk: String,
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format a probability as percentage
pub fn format_probability(probability: f64) -> String {
    format!("{:.1}%", probability * 100.0)
}

/// Color risk level
pub fn color_risk(level: RiskLevel) -> String {
    match level {
        RiskLevel::Low => level.as_str().green().to_string(),
        RiskLevel::Medium => level.as_str().yellow().to_string(),
        RiskLevel::High => level.as_str().red().bold().to_string(),
    }
}

/// One-line description of a correction reported by the preprocessor
pub fn describe_correction(correction: &Value) -> String {
    let kind = correction
        .get("kind")
        .and_then(Value::as_str)
        .unwrap_or("correction");
    let details: Vec<String> = correction
        .as_object()
        .into_iter()
        .flatten()
        .filter(|(key, _)| key.as_str() != "kind")
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}={}", key, s),
            other => format!("{}={}", key, other),
        })
        .collect();
    if details.is_empty() {
        kind.to_string()
    } else {
        format!("{} ({})", kind, details.join(", "))
    }
}

/// Write `id,probability,risk_level` rows
pub fn export_csv(path: &Path, predictions: &[ScoredPrediction]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    writer.write_record(["id", "probability", "risk_level"])?;
    for p in predictions {
        writer.write_record([p.id.as_str(), &p.probability.to_string(), p.risk_level.as_str()])?;
    }
    writer.flush().context("Failed to write export file")?;
    Ok(())
}

/// Render a scored batch, optionally filtered to one risk level
pub fn print_report(report: &PredictionReport, filter: Option<RiskFilter>, format: OutputFormat) -> Result<()> {
    let shown: Vec<&ScoredPrediction> = report
        .predictions
        .iter()
        .filter(|p| filter.map_or(true, |f| f.matches(p.risk_level)))
        .collect();

    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(report)?;
            value["predictions"] = serde_json::to_value(&shown)?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        OutputFormat::Table => {
            println!("{}", "Churn Predictions".bold());
            println!("{}", "=".repeat(50));
            println!("Model:   {}", report.model_version.cyan());
            println!("Scaler:  {}", report.scaler_version.cyan());
            println!();

            for correction in &report.corrections {
                print_warning(&describe_correction(correction));
            }
            if !report.corrections.is_empty() {
                println!();
            }

            if shown.is_empty() {
                println!("{}", "No predictions match the filter".yellow());
            } else {
                let rows: Vec<PredictionRow> = shown
                    .iter()
                    .map(|p| PredictionRow {
                        id: p.id.clone(),
                        probability: format_probability(p.probability),
                        risk: color_risk(p.risk_level),
                    })
                    .collect();
                let table = Table::new(rows).with(Style::rounded()).to_string();
                println!("{}", table);
            }

            let s = &report.summary;
            println!(
                "\nTotal: {} rows ({} high, {} medium, {} low)",
                s.total,
                s.high.to_string().red(),
                s.medium.to_string().yellow(),
                s.low.to_string().green()
            );
        }
    }

    Ok(())
}
