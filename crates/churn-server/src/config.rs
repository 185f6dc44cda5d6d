//! Server configuration

use anyhow::{Context, Result};
use churn_core::artifacts::{ArtifactConfig, DEFAULT_MAX_ARTIFACT_BYTES};
use churn_core::cache::{PredictionCache, DEFAULT_CACHE_CAPACITY};
use churn_core::predictor::{Predictor, DEFAULT_CHUNK_SIZE, DEFAULT_PARALLEL_THRESHOLD};
use churn_core::{ChurnPipeline, ColumnPolicy, RiskThresholds};
use serde::Deserialize;
use std::path::PathBuf;

/// Base name of the optional config file (`churn-server.toml`, `.json`, `.yaml`)
pub const CONFIG_FILE: &str = "churn-server";

/// Prefix of environment overrides, e.g. `CHURN_MODEL_PATH`
pub const ENV_PREFIX: &str = "CHURN";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Port for the prediction, health and metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Model manifest
    #[serde(default)]
    pub model_path: Option<PathBuf>,

    /// Scaling transform artifact
    #[serde(default)]
    pub scaler_path: Option<PathBuf>,

    /// Expected SHA-256 of the scaler artifact
    #[serde(default)]
    pub scaler_checksum: Option<String>,

    /// Missing-column policy for CSV uploads
    #[serde(default)]
    pub csv_policy: ColumnPolicy,

    /// Missing-column policy for JSON records
    #[serde(default)]
    pub json_policy: ColumnPolicy,

    /// Cached batches; 0 disables the cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default = "default_low_risk_threshold")]
    pub low_risk_threshold: f64,

    #[serde(default = "default_high_risk_threshold")]
    pub high_risk_threshold: f64,

    #[serde(default = "default_max_artifact_bytes")]
    pub max_artifact_bytes: u64,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "churn-server".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_parallel_threshold() -> usize {
    DEFAULT_PARALLEL_THRESHOLD
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_low_risk_threshold() -> f64 {
    RiskThresholds::default().low
}

fn default_high_risk_threshold() -> f64 {
    RiskThresholds::default().high
}

fn default_max_artifact_bytes() -> u64 {
    DEFAULT_MAX_ARTIFACT_BYTES
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            instance_name: default_instance_name(),
            api_port: default_api_port(),
            model_path: None,
            scaler_path: None,
            scaler_checksum: None,
            csv_policy: ColumnPolicy::default(),
            json_policy: ColumnPolicy::default(),
            cache_capacity: default_cache_capacity(),
            parallel_threshold: default_parallel_threshold(),
            chunk_size: default_chunk_size(),
            low_risk_threshold: default_low_risk_threshold(),
            high_risk_threshold: default_high_risk_threshold(),
            max_artifact_bytes: default_max_artifact_bytes(),
        }
    }
}

impl ServerConfig {
    /// Load from the optional config file, then `CHURN_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(CONFIG_FILE).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .context("Failed to read configuration sources")?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let parsed: Self = config
            .try_deserialize()
            .context("Invalid server configuration")?;
        parsed.risk_thresholds()?;
        Ok(parsed)
    }

    pub fn risk_thresholds(&self) -> Result<RiskThresholds> {
        RiskThresholds::new(self.low_risk_threshold, self.high_risk_threshold)
            .context("Invalid risk thresholds")
    }

    pub fn artifact_config(&self) -> ArtifactConfig {
        ArtifactConfig {
            model_path: self.model_path.clone(),
            scaler_path: self.scaler_path.clone(),
            scaler_checksum: self.scaler_checksum.clone(),
            max_artifact_bytes: self.max_artifact_bytes,
        }
    }

    pub fn pipeline(&self) -> ChurnPipeline {
        ChurnPipeline::new(Predictor::new(self.parallel_threshold, self.chunk_size))
            .with_cache(PredictionCache::new(self.cache_capacity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Result<ServerConfig> {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        ServerConfig::from_config(builder.build().unwrap())
    }

    #[test]
    fn test_defaults() {
        let config = from_pairs(&[]).unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.csv_policy, ColumnPolicy::Strict);
        assert_eq!(config.json_policy, ColumnPolicy::Strict);
        assert_eq!(config.cache_capacity, 256);
        assert_eq!(config.parallel_threshold, 1000);
        assert_eq!(config.max_artifact_bytes, 64 * 1024 * 1024);
        assert!(config.model_path.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = from_pairs(&[
            ("api_port", "9000"),
            ("json_policy", "lenient"),
            ("model_path", "/srv/model.json"),
            ("cache_capacity", "0"),
        ])
        .unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.json_policy, ColumnPolicy::Lenient);
        assert_eq!(config.csv_policy, ColumnPolicy::Strict);
        assert_eq!(config.model_path, Some(PathBuf::from("/srv/model.json")));
        assert!(config.pipeline().cache().is_none());
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let err = from_pairs(&[("low_risk_threshold", "0.9"), ("high_risk_threshold", "0.1")]).unwrap_err();
        assert!(format!("{:#}", err).contains("invalid risk thresholds"));
    }
}
