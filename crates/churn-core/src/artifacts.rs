//! Loading and validating the trained artifacts
//!
//! The scaler and the model are produced offline and read once per process.
//! Every file is size-checked before it is read and, when an expected
//! SHA-256 is configured, checksum-validated before it is parsed.

use crate::error::{ChurnError, Result};
use crate::predictor::{
    ChurnClassifier, ForestClassifier, LogisticClassifier, ModelKind, ModelManifest, OnnxClassifier,
};
use crate::preprocessor::ScalingTransform;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default upper bound on any artifact file
pub const DEFAULT_MAX_ARTIFACT_BYTES: u64 = 64 * 1024 * 1024;

/// SHA-256 of `data` as lowercase hex
pub fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Where to find the artifacts and how to validate them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactConfig {
    pub model_path: Option<PathBuf>,
    pub scaler_path: Option<PathBuf>,
    /// Expected SHA-256 of the scaler file
    pub scaler_checksum: Option<String>,
    pub max_artifact_bytes: u64,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            model_path: None,
            scaler_path: None,
            scaler_checksum: None,
            max_artifact_bytes: DEFAULT_MAX_ARTIFACT_BYTES,
        }
    }
}

/// Read a file after checking its size, reporting failures through `error`
fn read_artifact(path: &Path, max_bytes: u64, error: fn(String) -> ChurnError) -> Result<Vec<u8>> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| error(format!("cannot access {}: {}", path.display(), e)))?;
    if metadata.len() > max_bytes {
        return Err(error(format!(
            "{} is {} bytes, exceeds maximum {}",
            path.display(),
            metadata.len(),
            max_bytes
        )));
    }
    std::fs::read(path).map_err(|e| error(format!("cannot read {}: {}", path.display(), e)))
}

fn verify_checksum(
    path: &Path,
    data: &[u8],
    expected: Option<&str>,
    error: fn(String) -> ChurnError,
) -> Result<()> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let computed = compute_checksum(data);
    if !computed.eq_ignore_ascii_case(expected.trim()) {
        return Err(error(format!(
            "checksum mismatch for {}: expected {}, got {}",
            path.display(),
            expected,
            computed
        )));
    }
    debug!(path = %path.display(), checksum = %computed, "Artifact checksum validated");
    Ok(())
}

/// Load the fitted scaling transform.
///
/// Every failure, including a missing file, is a [`ChurnError::Config`].
pub fn load_scaler(path: &Path, expected_checksum: Option<&str>, max_bytes: u64) -> Result<ScalingTransform> {
    let bytes = read_artifact(path, max_bytes, ChurnError::Config)?;
    verify_checksum(path, &bytes, expected_checksum, ChurnError::Config)?;
    let scaler = ScalingTransform::from_json(&bytes).map_err(|e| match e {
        ChurnError::Serialization(e) => {
            ChurnError::Config(format!("invalid scaler artifact {}: {}", path.display(), e))
        }
        other => other,
    })?;
    info!(path = %path.display(), version = %scaler.version(), "Loaded scaling transform");
    Ok(scaler)
}

/// Load a classifier from its manifest.
///
/// ONNX graph paths are resolved relative to the manifest's directory.
/// Every failure is a [`ChurnError::Model`].
pub fn load_model(manifest_path: &Path, max_bytes: u64) -> Result<Arc<dyn ChurnClassifier>> {
    let bytes = read_artifact(manifest_path, max_bytes, ChurnError::Model)?;
    let manifest = ModelManifest::from_json(&bytes)?;
    let kind = manifest.kind.name();

    let model: Arc<dyn ChurnClassifier> = match manifest.kind {
        ModelKind::Logistic {
            coefficients,
            intercept,
        } => Arc::new(LogisticClassifier::new(
            manifest.version,
            manifest.feature_names,
            coefficients,
            intercept,
        )?),
        ModelKind::Forest { trees } => Arc::new(ForestClassifier::new(
            manifest.version,
            manifest.feature_names,
            trees,
        )?),
        ModelKind::Onnx { path, sha256 } => {
            let graph_path = match manifest_path.parent() {
                Some(dir) if path.is_relative() => dir.join(&path),
                _ => path,
            };
            let graph = read_artifact(&graph_path, max_bytes, ChurnError::Model)?;
            verify_checksum(&graph_path, &graph, sha256.as_deref(), ChurnError::Model)?;
            Arc::new(OnnxClassifier::from_bytes(
                &graph,
                manifest.version,
                manifest.feature_names,
            )?)
        }
    };

    info!(
        path = %manifest_path.display(),
        kind = kind,
        version = %model.version(),
        features = model.feature_names().len(),
        "Loaded model"
    );
    Ok(model)
}

/// The scaler and model a pipeline runs with, shared read-only
#[derive(Clone, Default)]
pub struct ArtifactSet {
    scaler: Option<Arc<ScalingTransform>>,
    model: Option<Arc<dyn ChurnClassifier>>,
}

impl std::fmt::Debug for ArtifactSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactSet")
            .field("scaler_version", &self.scaler_version())
            .field("model_version", &self.model_version())
            .finish()
    }
}

impl ArtifactSet {
    pub fn new(scaler: Option<ScalingTransform>, model: Option<Arc<dyn ChurnClassifier>>) -> Self {
        Self {
            scaler: scaler.map(Arc::new),
            model,
        }
    }

    /// Load whichever artifacts are configured; unconfigured ones stay absent
    pub fn load(config: &ArtifactConfig) -> Result<Self> {
        let scaler = match &config.scaler_path {
            Some(path) => Some(load_scaler(
                path,
                config.scaler_checksum.as_deref(),
                config.max_artifact_bytes,
            )?),
            None => {
                warn!("No scaler path configured");
                None
            }
        };
        let model = match &config.model_path {
            Some(path) => Some(load_model(path, config.max_artifact_bytes)?),
            None => {
                warn!("No model path configured");
                None
            }
        };
        Ok(Self::new(scaler, model))
    }

    pub fn scaler(&self) -> Option<&ScalingTransform> {
        self.scaler.as_deref()
    }

    pub fn model(&self) -> Option<&dyn ChurnClassifier> {
        self.model.as_deref()
    }

    pub fn scaler_version(&self) -> Option<&str> {
        self.scaler().map(|s| s.version())
    }

    pub fn model_version(&self) -> Option<&str> {
        self.model().map(|m| m.version())
    }

    pub fn is_complete(&self) -> bool {
        self.scaler.is_some() && self.model.is_some()
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            scaler_version: self.scaler_version().map(str::to_string),
            model_version: self.model_version().map(str::to_string),
            model_kind: self.model().map(|m| m.kind().to_string()),
            feature_names: self
                .model()
                .map(|m| m.feature_names().to_vec())
                .unwrap_or_default(),
        }
    }
}

/// Summary of the loaded artifacts for clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub scaler_version: Option<String>,
    pub model_version: Option<String>,
    pub model_kind: Option<String>,
    pub feature_names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::feature_column_names;
    use std::fs;
    use tempfile::TempDir;

    const SCALER_JSON: &str = r#"{
        "version": "scaler-2024-01",
        "columns": ["subscription_age", "reamining_contract", "service_failure_count", "download_avg", "upload_avg"],
        "mean": [2.4, 0.5, 0.3, 43.0, 4.2],
        "scale": [2.0, 0.7, 0.8, 63.0, 9.8]
    }"#;

    fn logistic_manifest() -> String {
        serde_json::json!({
            "version": "lr-7",
            "kind": "logistic",
            "feature_names": feature_column_names(),
            "coefficients": vec![0.1; 15],
            "intercept": -0.5
        })
        .to_string()
    }

    #[test]
    fn test_compute_checksum() {
        assert_eq!(
            compute_checksum(b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_load_scaler_with_checksum() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scaler.json");
        fs::write(&path, SCALER_JSON).unwrap();
        let checksum = compute_checksum(SCALER_JSON.as_bytes());

        let scaler = load_scaler(&path, Some(&checksum.to_uppercase()), DEFAULT_MAX_ARTIFACT_BYTES).unwrap();
        assert_eq!(scaler.version(), "scaler-2024-01");

        let err = load_scaler(&path, Some("deadbeef"), DEFAULT_MAX_ARTIFACT_BYTES).unwrap_err();
        assert!(matches!(err, ChurnError::Config(_)));
        assert!(err.to_string().contains("checksum mismatch"));
    }

    #[test]
    fn test_scaler_errors_are_config_errors() {
        let dir = TempDir::new().unwrap();
        let missing = load_scaler(&dir.path().join("absent.json"), None, DEFAULT_MAX_ARTIFACT_BYTES);
        assert!(matches!(missing, Err(ChurnError::Config(_))));

        let path = dir.path().join("bad.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            load_scaler(&path, None, DEFAULT_MAX_ARTIFACT_BYTES),
            Err(ChurnError::Config(_))
        ));

        let path = dir.path().join("big.json");
        fs::write(&path, SCALER_JSON).unwrap();
        let err = load_scaler(&path, None, 10).unwrap_err();
        assert!(err.to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_load_logistic_model() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        fs::write(&path, logistic_manifest()).unwrap();

        let model = load_model(&path, DEFAULT_MAX_ARTIFACT_BYTES).unwrap();
        assert_eq!(model.version(), "lr-7");
        assert_eq!(model.kind(), "logistic");
        assert_eq!(model.feature_names(), feature_column_names().as_slice());
    }

    #[test]
    fn test_onnx_checksum_checked_before_parse() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("graph.onnx"), b"fake graph").unwrap();
        let manifest = serde_json::json!({
            "version": "onnx-1",
            "kind": "onnx",
            "feature_names": feature_column_names(),
            "path": "graph.onnx",
            "sha256": "0000"
        });
        let path = dir.path().join("model.json");
        fs::write(&path, manifest.to_string()).unwrap();

        let Err(err) = load_model(&path, DEFAULT_MAX_ARTIFACT_BYTES) else {
            panic!("checksum mismatch accepted");
        };
        assert!(matches!(err, ChurnError::Model(_)));
        assert!(err.to_string().contains("checksum mismatch"), "{}", err);
    }

    #[test]
    fn test_artifact_set_load() {
        let dir = TempDir::new().unwrap();
        let scaler_path = dir.path().join("scaler.json");
        let model_path = dir.path().join("model.json");
        fs::write(&scaler_path, SCALER_JSON).unwrap();
        fs::write(&model_path, logistic_manifest()).unwrap();

        let empty = ArtifactSet::load(&ArtifactConfig::default()).unwrap();
        assert!(!empty.is_complete());
        assert_eq!(empty.info().feature_names.len(), 0);

        let config = ArtifactConfig {
            model_path: Some(model_path),
            scaler_path: Some(scaler_path),
            ..ArtifactConfig::default()
        };
        let set = ArtifactSet::load(&config).unwrap();
        assert!(set.is_complete());
        let info = set.info();
        assert_eq!(info.scaler_version.as_deref(), Some("scaler-2024-01"));
        assert_eq!(info.model_kind.as_deref(), Some("logistic"));
        assert_eq!(info.feature_names.len(), 15);
    }
}
