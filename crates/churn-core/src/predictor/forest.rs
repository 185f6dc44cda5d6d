//! Decision tree ensemble classifier

use super::ChurnClassifier;
use crate::error::{ChurnError, Result};
use crate::models::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// Tree node; leaves carry the positive-class probability of their samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    Leaf {
        probability: f64,
    },
    /// Rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

impl TreeNode {
    fn predict_sample(&self, sample: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { probability } => *probability,
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if sample[*feature_idx] <= *threshold {
                    left.predict_sample(sample)
                } else {
                    right.predict_sample(sample)
                }
            }
        }
    }

    fn validate(&self, n_features: usize) -> Result<()> {
        match self {
            TreeNode::Leaf { probability } => {
                if !(0.0..=1.0).contains(probability) {
                    return Err(ChurnError::Model(format!(
                        "leaf probability {} is outside [0, 1]",
                        probability
                    )));
                }
                Ok(())
            }
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if *feature_idx >= n_features {
                    return Err(ChurnError::Model(format!(
                        "split on feature {} but model has {} features",
                        feature_idx, n_features
                    )));
                }
                if threshold.is_nan() {
                    return Err(ChurnError::Model("split threshold is NaN".to_string()));
                }
                left.validate(n_features)?;
                right.validate(n_features)
            }
        }
    }
}

/// Averages the leaf probabilities of every tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestClassifier {
    version: String,
    feature_names: Vec<String>,
    trees: Vec<TreeNode>,
}

impl ForestClassifier {
    pub fn new(version: impl Into<String>, feature_names: Vec<String>, trees: Vec<TreeNode>) -> Result<Self> {
        if trees.is_empty() {
            return Err(ChurnError::Model("forest has no trees".to_string()));
        }
        for tree in &trees {
            tree.validate(feature_names.len())?;
        }
        Ok(Self {
            version: version.into(),
            feature_names,
            trees,
        })
    }
}

impl ChurnClassifier for ForestClassifier {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn kind(&self) -> &'static str {
        "forest"
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_cols() != self.feature_names.len() {
            return Err(ChurnError::Model(format!(
                "expected {} features, got {}",
                self.feature_names.len(),
                features.n_cols()
            )));
        }
        let n_trees = self.trees.len() as f64;
        Ok(features
            .rows()
            .map(|row| self.trees.iter().map(|t| t.predict_sample(row)).sum::<f64>() / n_trees)
            .collect())
    }
}
