//! Frozen logistic model. Bias and per-feature weights come from a JSON artifact;
//! if the artifact is absent the built-in weights are used.

use super::{Confidence, ModelRequest, ModelResponse, RiskModel};
use crate::error::{ModelError, ModelLoadError};
use crate::features::MODEL_FEATURES;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Minimum weighted contribution for a feature to count as a reason code.
const DRIVER_FLOOR: f64 = 0.5;
const MAX_DRIVERS: usize = 3;
const SETTLED_HISTORY: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub version: String,
    pub bias: f64,
    pub weights: BTreeMap<String, f64>,
}

impl Default for ModelArtifact {
    fn default() -> Self {
        let weights = [
            ("amount", 0.15),
            ("velocity", 0.4),
            ("amount_deviation", 0.9),
            ("amount_zscore", 0.25),
            ("rapid_succession", 1.2),
            ("cold_start", 0.7),
            ("new_category", 0.5),
            ("remote_channel", 0.6),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            version: "builtin-1".to_string(),
            bias: -2.5,
            weights,
        }
    }
}

pub struct LogisticModel {
    version: String,
    bias: f64,
    /// Aligned with `MODEL_FEATURES`
    weights: [f64; MODEL_FEATURES.len()],
}

impl LogisticModel {
    /// Load an artifact. A missing file falls back to the built-in weights.
    pub fn load(path: &Path) -> Result<Self, ModelLoadError> {
        if !path.exists() {
            tracing::warn!(path = %path.display(), "model artifact not found; using built-in weights");
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let artifact: ModelArtifact = serde_json::from_str(&data)?;
        let model = Self::from_artifact(artifact)?;
        tracing::info!(path = %path.display(), version = %model.version, "model artifact loaded");
        Ok(model)
    }

    /// Features missing from the artifact get weight zero; unknown names are refused.
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self, ModelLoadError> {
        let mut weights = [0.0; MODEL_FEATURES.len()];
        for (name, w) in &artifact.weights {
            let idx = MODEL_FEATURES
                .iter()
                .position(|f| f == name)
                .ok_or_else(|| ModelLoadError::UnknownFeature(name.clone()))?;
            weights[idx] = *w;
        }
        Ok(Self {
            version: artifact.version,
            bias: artifact.bias,
            weights,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl Default for LogisticModel {
    fn default() -> Self {
        let artifact = ModelArtifact::default();
        let mut weights = [0.0; MODEL_FEATURES.len()];
        for (i, name) in MODEL_FEATURES.iter().enumerate() {
            weights[i] = artifact.weights.get(*name).copied().unwrap_or(0.0);
        }
        Self {
            version: artifact.version,
            bias: artifact.bias,
            weights,
        }
    }
}

impl RiskModel for LogisticModel {
    fn name(&self) -> &str {
        "logistic"
    }

    fn infer(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        if request.inputs.len() != self.weights.len() {
            return Err(ModelError::Failed(format!(
                "expected {} inputs, got {}",
                self.weights.len(),
                request.inputs.len()
            )));
        }
        if let Some(bad) = request.inputs.iter().position(|x| !x.is_finite()) {
            return Err(ModelError::Failed(format!(
                "non-finite input `{}`",
                request.feature_names.get(bad).copied().unwrap_or("?")
            )));
        }

        let contributions: Vec<(usize, f64)> = self
            .weights
            .iter()
            .zip(&request.inputs)
            .map(|(w, x)| w * x)
            .enumerate()
            .collect();
        let logit = self.bias + contributions.iter().map(|(_, c)| c).sum::<f64>();
        let score = 1.0 / (1.0 + (-logit).exp());

        let mut strongest: Vec<(usize, f64)> = contributions
            .into_iter()
            .filter(|(_, c)| *c >= DRIVER_FLOOR)
            .collect();
        strongest.sort_by(|a, b| b.1.total_cmp(&a.1));
        let drivers = strongest
            .into_iter()
            .take(MAX_DRIVERS)
            .map(|(i, _)| MODEL_FEATURES[i].to_string())
            .collect();

        let confidence = if request.cold_start {
            Confidence::Low
        } else if request.history_len < SETTLED_HISTORY {
            Confidence::Medium
        } else {
            Confidence::High
        };

        Ok(ModelResponse {
            score,
            confidence,
            drivers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(inputs: [f64; 8], history_len: usize) -> ModelRequest {
        ModelRequest {
            inputs: inputs.to_vec(),
            feature_names: &MODEL_FEATURES,
            transaction_id: "t".into(),
            account_id: "a".into(),
            history_len,
            cold_start: history_len == 0,
        }
    }

    #[test]
    fn cold_start_small_amount_scores_low() {
        let m = LogisticModel::default();
        // amount 100, velocity 1, no history
        let r = m
            .infer(&request([101f64.ln(), 2f64.ln(), 0.0, 0.0, 0.0, 1.0, 0.0, 0.0], 0))
            .unwrap();
        assert!(r.score > 0.2 && r.score < 0.5, "score {}", r.score);
        assert_eq!(r.confidence, Confidence::Low);
        assert!(r.drivers.is_empty() || r.drivers.contains(&"cold_start".to_string()));
    }

    #[test]
    fn spike_scores_critical_with_drivers() {
        let m = LogisticModel::default();
        // 50x the mean, 30 seconds after the previous transaction
        let r = m
            .infer(&request(
                [5001f64.ln(), 3f64.ln(), 50f64.ln(), 0.0, 1.0 / 1.5, 0.0, 0.0, 0.0],
                1,
            ))
            .unwrap();
        assert!(r.score >= 0.9, "score {}", r.score);
        assert_eq!(r.confidence, Confidence::Medium);
        assert_eq!(r.drivers[0], "amount_deviation");
        assert!(r.drivers.len() <= MAX_DRIVERS);
    }

    #[test]
    fn rejects_wrong_arity_and_nan() {
        let m = LogisticModel::default();
        let mut req = request([0.0; 8], 3);
        req.inputs.pop();
        assert!(matches!(m.infer(&req), Err(ModelError::Failed(_))));
        let req = request([0.0, f64::NAN, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 3);
        assert!(matches!(m.infer(&req), Err(ModelError::Failed(_))));
    }

    #[test]
    fn artifact_round_trip_and_unknown_features() {
        let json = r#"{"version":"v7","bias":-1.0,"weights":{"amount":0.2,"velocity":0.1}}"#;
        let artifact: ModelArtifact = serde_json::from_str(json).unwrap();
        let m = LogisticModel::from_artifact(artifact).unwrap();
        assert_eq!(m.version(), "v7");

        let mut bad = ModelArtifact::default();
        bad.weights.insert("shoe_size".into(), 1.0);
        assert!(matches!(
            LogisticModel::from_artifact(bad),
            Err(ModelLoadError::UnknownFeature(f)) if f == "shoe_size"
        ));
    }

    #[test]
    fn load_reads_file_or_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        assert_eq!(LogisticModel::load(&path).unwrap().version(), "builtin-1");

        std::fs::write(&path, r#"{"version":"v2","bias":0.0,"weights":{}}"#).unwrap();
        let m = LogisticModel::load(&path).unwrap();
        assert_eq!(m.version(), "v2");
        let r = m.infer(&request([1.0; 8], 10)).unwrap();
        assert_eq!(r.score, 0.5);
        assert_eq!(r.confidence, Confidence::High);
    }
}
