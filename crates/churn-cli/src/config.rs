//! Configuration management for the CLI

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration, read from `~/.config/churn/config.json`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Server URL for `churn remote`
    pub api_url: Option<String>,
    /// Default model manifest
    pub model_path: Option<PathBuf>,
    /// Default scaling transform
    pub scaler_path: Option<PathBuf>,
    /// Expected SHA-256 of the scaler
    pub scaler_checksum: Option<String>,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from `path`; a missing file yields the defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    fn config_path() -> Option<PathBuf> {
        let home = dirs_next::home_dir()?;
        Some(home.join(".config").join("churn").join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert!(config.api_url.is_none());
        assert!(config.model_path.is_none());
    }

    #[test]
    fn test_partial_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"api_url": "http://churn:8080", "model_path": "/srv/model.json"}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.api_url.as_deref(), Some("http://churn:8080"));
        assert_eq!(config.model_path, Some(PathBuf::from("/srv/model.json")));
        assert!(config.scaler_path.is_none());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
