//! Churn prediction CLI
//!
//! Scores subscriber tables locally or against a running churn-server,
//! inspects trained artifacts and prints an input template.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use churn_core::{artifacts::DEFAULT_MAX_ARTIFACT_BYTES, ArtifactConfig, ColumnPolicy, RiskThresholds};
use clap::{Parser, Subcommand};
use commands::{inspect, predict, remote, template};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Churn prediction CLI
#[derive(Parser)]
#[command(name = "churn")]
#[command(author, version, about = "CLI for the churn prediction pipeline", long_about = None)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Artifact locations; flags and env vars override the config file
#[derive(clap::Args)]
pub struct ArtifactArgs {
    /// Scaling transform artifact
    #[arg(long, env = "CHURN_SCALER_PATH")]
    pub scaler: Option<PathBuf>,

    /// Model manifest
    #[arg(long, env = "CHURN_MODEL_PATH")]
    pub model: Option<PathBuf>,

    /// Expected SHA-256 of the scaler artifact
    #[arg(long, env = "CHURN_SCALER_CHECKSUM")]
    pub scaler_checksum: Option<String>,
}

impl ArtifactArgs {
    fn resolve(self, config: &config::Config) -> ArtifactConfig {
        ArtifactConfig {
            model_path: self.model.or_else(|| config.model_path.clone()),
            scaler_path: self.scaler.or_else(|| config.scaler_path.clone()),
            scaler_checksum: self.scaler_checksum.or_else(|| config.scaler_checksum.clone()),
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Score a CSV or JSON file locally
    Predict {
        /// Input table (.csv or .json)
        input: PathBuf,

        #[command(flatten)]
        artifacts: ArtifactArgs,

        /// Missing-column policy (strict, lenient)
        #[arg(long, default_value = "strict")]
        policy: ColumnPolicy,

        /// Show only rows at this risk level
        #[arg(long)]
        risk: Option<output::RiskFilter>,

        /// Write id,probability,risk_level rows to a CSV file
        #[arg(long, short)]
        export: Option<PathBuf>,

        /// Probabilities above this are at least medium risk
        #[arg(long, default_value_t = 0.3)]
        low_threshold: f64,

        /// Probabilities above this are high risk
        #[arg(long, default_value_t = 0.7)]
        high_threshold: f64,
    },

    /// Describe the scaler and model artifacts
    Inspect {
        #[command(flatten)]
        artifacts: ArtifactArgs,
    },

    /// Print a CSV input template
    Template {
        /// Write to a file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Talk to a running churn-server
    #[command(subcommand)]
    Remote(RemoteCommands),
}

#[derive(Subcommand)]
pub enum RemoteCommands {
    /// Upload a file for scoring
    Predict {
        /// Input table (.csv or .json)
        input: PathBuf,

        /// API endpoint URL
        #[arg(long, env = "CHURN_API_URL")]
        api_url: Option<String>,

        /// Show only rows at this risk level
        #[arg(long)]
        risk: Option<output::RiskFilter>,

        /// Write id,probability,risk_level rows to a CSV file
        #[arg(long, short)]
        export: Option<PathBuf>,
    },

    /// Show the artifacts loaded by the server
    Model {
        /// API endpoint URL
        #[arg(long, env = "CHURN_API_URL")]
        api_url: Option<String>,
    },
}

const DEFAULT_API_URL: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .compact()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::new(if cli.verbose { "debug" } else { "warn" }))
        .init();

    let config = config::Config::load()?;
    let api_url = |flag: Option<String>| {
        flag.or_else(|| config.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    };

    match cli.command {
        Commands::Predict {
            input,
            artifacts,
            policy,
            risk,
            export,
            low_threshold,
            high_threshold,
        } => {
            let options = predict::PredictOptions {
                input,
                artifacts: artifacts.resolve(&config),
                policy,
                thresholds: RiskThresholds::new(low_threshold, high_threshold)?,
                filter: risk,
                export,
                format: cli.format,
            };
            // Loading and scoring are CPU-bound
            tokio::task::spawn_blocking(move || predict::run(options)).await??;
        }
        Commands::Inspect { artifacts } => {
            inspect::run(&artifacts.resolve(&config), cli.format)?;
        }
        Commands::Template { output } => {
            template::run(output.as_deref())?;
        }
        Commands::Remote(remote_cmd) => match remote_cmd {
            RemoteCommands::Predict {
                input,
                api_url: url,
                risk,
                export,
            } => {
                let client = client::ApiClient::new(&api_url(url))?;
                remote::predict(&client, &input, risk, export, cli.format).await?;
            }
            RemoteCommands::Model { api_url: url } => {
                let client = client::ApiClient::new(&api_url(url))?;
                remote::model(&client, cli.format).await?;
            }
        },
    }

    Ok(())
}
