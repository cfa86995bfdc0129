//! Per-feature standardization

use crate::models::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

/// Centering and scaling parameters learned from a training corpus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: [f64; FEATURE_COUNT],
    /// Population standard deviation; zero-variance columns are stored as 1.0
    pub scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Fit on a non-empty corpus. Returns `None` for an empty one.
    pub fn fit(corpus: &[FeatureVector]) -> Option<Self> {
        if corpus.is_empty() {
            return None;
        }
        let n = corpus.len() as f64;

        let mut mean = [0.0; FEATURE_COUNT];
        for row in corpus {
            for (m, v) in mean.iter_mut().zip(row.to_array()) {
                *m += v;
            }
        }
        mean.iter_mut().for_each(|m| *m /= n);

        let mut var = [0.0; FEATURE_COUNT];
        for row in corpus {
            for (i, v) in row.to_array().iter().enumerate() {
                var[i] += (v - mean[i]).powi(2);
            }
        }

        let mut scale = [1.0; FEATURE_COUNT];
        for i in 0..FEATURE_COUNT {
            let std = (var[i] / n).sqrt();
            scale[i] = if std > f64::EPSILON * mean[i].abs().max(1.0) {
                std
            } else {
                1.0
            };
        }

        Some(Self { mean, scale })
    }

    /// Standardize one feature vector
    pub fn transform(&self, features: &FeatureVector) -> [f64; FEATURE_COUNT] {
        let mut out = features.to_array();
        for i in 0..FEATURE_COUNT {
            out[i] = (out[i] - self.mean[i]) / self.scale[i];
        }
        out
    }

    /// Parameters must be finite and scales positive
    pub fn validate(&self) -> Result<(), String> {
        if self.mean.iter().any(|m| !m.is_finite()) {
            return Err("scaler mean contains non-finite values".to_string());
        }
        if self.scale.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("scaler scale must be finite and positive".to_string());
        }
        Ok(())
    }
}
