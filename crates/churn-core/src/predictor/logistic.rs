//! Logistic regression classifier

use super::ChurnClassifier;
use crate::error::{ChurnError, Result};
use crate::models::FeatureMatrix;
use serde::{Deserialize, Serialize};

/// `p = sigmoid(intercept + coefficients . x)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticClassifier {
    version: String,
    feature_names: Vec<String>,
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LogisticClassifier {
    pub fn new(
        version: impl Into<String>,
        feature_names: Vec<String>,
        coefficients: Vec<f64>,
        intercept: f64,
    ) -> Result<Self> {
        if coefficients.len() != feature_names.len() {
            return Err(ChurnError::Model(format!(
                "logistic model has {} coefficients for {} features",
                coefficients.len(),
                feature_names.len()
            )));
        }
        if !intercept.is_finite() || coefficients.iter().any(|c| !c.is_finite()) {
            return Err(ChurnError::Model(
                "logistic model has non-finite weights".to_string(),
            ));
        }
        Ok(Self {
            version: version.into(),
            feature_names,
            coefficients,
            intercept,
        })
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl ChurnClassifier for LogisticClassifier {
    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn kind(&self) -> &'static str {
        "logistic"
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>> {
        if features.n_cols() != self.coefficients.len() {
            return Err(ChurnError::Model(format!(
                "expected {} features, got {}",
                self.coefficients.len(),
                features.n_cols()
            )));
        }
        Ok(features
            .rows()
            .map(|row| {
                let z = row
                    .iter()
                    .zip(&self.coefficients)
                    .fold(self.intercept, |acc, (x, w)| acc + x * w);
                sigmoid(z)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sigmoid_output() {
        let model = LogisticClassifier::new("lr-1", vec!["a".into(), "b".into()], vec![1.0, -1.0], 0.0).unwrap();
        let features = FeatureMatrix::new(
            vec!["a".into(), "b".into()],
            vec![vec![0.0, 0.0], vec![2.0, 0.0], vec![-50.0, 50.0]],
        )
        .unwrap();
        let p = model.predict_proba(&features).unwrap();
        assert_eq!(p[0], 0.5);
        assert!((p[1] - 0.880_797_077_977_882_3).abs() < 1e-12);
        assert!(p[2] >= 0.0 && p[2] < 1e-40);
    }

    #[test]
    fn test_rejects_weight_count_mismatch() {
        let err = LogisticClassifier::new("x", vec!["a".into()], vec![1.0, 2.0], 0.0).unwrap_err();
        assert!(matches!(err, ChurnError::Model(_)));
    }
}
