//! Model manifest: the JSON document describing a trained classifier

use super::forest::TreeNode;
use crate::error::{ChurnError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub version: String,
    /// Feature columns the model was trained on, in order
    pub feature_names: Vec<String>,
    #[serde(flatten)]
    pub kind: ModelKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelKind {
    Logistic {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    Forest {
        trees: Vec<TreeNode>,
    },
    Onnx {
        /// Graph file, relative paths resolve against the manifest's directory
        path: PathBuf,
        /// Expected SHA-256 of the graph file
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sha256: Option<String>,
    },
}

impl ModelKind {
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::Logistic { .. } => "logistic",
            ModelKind::Forest { .. } => "forest",
            ModelKind::Onnx { .. } => "onnx",
        }
    }
}

impl ModelManifest {
    /// Parse a manifest; malformed documents are model errors
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let manifest: Self = serde_json::from_slice(bytes)
            .map_err(|e| ChurnError::Model(format!("invalid model manifest: {}", e)))?;
        if manifest.feature_names.is_empty() {
            return Err(ChurnError::Model(
                "model manifest declares no feature names".to_string(),
            ));
        }
        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_logistic_manifest() {
        let json = br#"{
            "version": "lr-2024-03",
            "kind": "logistic",
            "feature_names": ["a", "b"],
            "coefficients": [0.5, -0.25],
            "intercept": 0.1
        }"#;
        let manifest = ModelManifest::from_json(json).unwrap();
        assert_eq!(manifest.version, "lr-2024-03");
        assert_eq!(manifest.kind.name(), "logistic");
        assert_eq!(
            manifest.kind,
            ModelKind::Logistic {
                coefficients: vec![0.5, -0.25],
                intercept: 0.1
            }
        );
    }

    #[test]
    fn test_parse_onnx_manifest_without_checksum() {
        let json = br#"{"version": "onnx-1", "kind": "onnx", "feature_names": ["a"], "path": "model.onnx"}"#;
        let manifest = ModelManifest::from_json(json).unwrap();
        match manifest.kind {
            ModelKind::Onnx { path, sha256 } => {
                assert_eq!(path, PathBuf::from("model.onnx"));
                assert!(sha256.is_none());
            }
            other => panic!("unexpected kind {:?}", other),
        }
    }

    #[test]
    fn test_unknown_kind_is_model_error() {
        let json = br#"{"version": "x", "kind": "svm", "feature_names": ["a"]}"#;
        assert!(matches!(ModelManifest::from_json(json), Err(ChurnError::Model(_))));
    }
}
