//! Fail-open wrapper around a [`RiskModel`]: every call gets a latency budget, and
//! any failure turns into a low-confidence sentinel score instead of an error.

use super::{Confidence, ModelRequest, RiskModel, RiskScore};
use crate::config::ModelConfig;
use crate::error::ModelError;
use crate::features::{FeatureVector, MODEL_FEATURES};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct ModelAdapter {
    model: Arc<dyn RiskModel>,
    timeout: Duration,
    fallback_score: f64,
}

impl ModelAdapter {
    pub fn new(model: Arc<dyn RiskModel>, config: &ModelConfig) -> Self {
        Self {
            model,
            timeout: config.timeout(),
            fallback_score: config.fallback_score.clamp(0.0, 1.0),
        }
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Score through the model, surfacing failures.
    pub async fn try_score(&self, features: &FeatureVector) -> Result<RiskScore, ModelError> {
        let request = ModelRequest {
            inputs: features.model_inputs().to_vec(),
            feature_names: &MODEL_FEATURES,
            transaction_id: features.transaction_id.clone(),
            account_id: features.account_id.clone(),
            history_len: features.history_len,
            cold_start: features.cold_start,
        };
        let model = Arc::clone(&self.model);
        let call = tokio::task::spawn_blocking(move || model.infer(&request));

        let response = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => return Err(ModelError::Timeout(self.timeout)),
            Ok(Err(join)) => return Err(ModelError::Aborted(join.to_string())),
            Ok(Ok(result)) => result?,
        };
        if !response.score.is_finite() || !(0.0..=1.0).contains(&response.score) {
            return Err(ModelError::MalformedOutput(format!("score {}", response.score)));
        }

        Ok(RiskScore {
            transaction_id: features.transaction_id.clone(),
            account_id: features.account_id.clone(),
            score: response.score,
            confidence: response.confidence,
            degraded: false,
            reason_codes: response.drivers,
            computed_at: Utc::now(),
        })
    }

    /// Score, falling back to the sentinel on any model failure. Never fails.
    pub async fn score(&self, features: &FeatureVector) -> RiskScore {
        match self.try_score(features).await {
            Ok(score) => score,
            Err(e) => {
                warn!(
                    transaction_id = %features.transaction_id,
                    account_id = %features.account_id,
                    model = self.model.name(),
                    error = %e,
                    "model unavailable; failing open"
                );
                self.degraded(features)
            }
        }
    }

    fn degraded(&self, features: &FeatureVector) -> RiskScore {
        RiskScore {
            transaction_id: features.transaction_id.clone(),
            account_id: features.account_id.clone(),
            score: self.fallback_score,
            confidence: Confidence::Low,
            degraded: true,
            reason_codes: Vec::new(),
            computed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Channel;
    use crate::model::{LogisticModel, ModelResponse};

    struct Fixed(f64);

    impl RiskModel for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }
        fn infer(&self, _: &ModelRequest) -> Result<ModelResponse, ModelError> {
            Ok(ModelResponse {
                score: self.0,
                confidence: Confidence::High,
                drivers: vec!["velocity".into()],
            })
        }
    }

    struct Slow;

    impl RiskModel for Slow {
        fn name(&self) -> &str {
            "slow"
        }
        fn infer(&self, _: &ModelRequest) -> Result<ModelResponse, ModelError> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(ModelResponse {
                score: 0.99,
                confidence: Confidence::High,
                drivers: Vec::new(),
            })
        }
    }

    struct Broken;

    impl RiskModel for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn infer(&self, _: &ModelRequest) -> Result<ModelResponse, ModelError> {
            Err(ModelError::Failed("artifact corrupted".into()))
        }
    }

    struct Panicky;

    impl RiskModel for Panicky {
        fn name(&self) -> &str {
            "panicky"
        }
        fn infer(&self, _: &ModelRequest) -> Result<ModelResponse, ModelError> {
            panic!("model crashed")
        }
    }

    fn features() -> FeatureVector {
        FeatureVector {
            transaction_id: "t1".into(),
            account_id: "a".into(),
            amount: 100.0,
            channel: Channel::Pos,
            velocity_count: 1,
            rolling_mean: 0.0,
            rolling_std: 0.0,
            amount_to_mean_ratio: 1.0,
            amount_zscore: 0.0,
            seconds_since_last: None,
            history_len: 0,
            cold_start: true,
            new_category: false,
        }
    }

    fn adapter(model: impl RiskModel + 'static, timeout_ms: u64) -> ModelAdapter {
        ModelAdapter::new(
            Arc::new(model),
            &ModelConfig {
                artifact_path: None,
                timeout_ms,
                fallback_score: 0.5,
            },
        )
    }

    #[tokio::test]
    async fn passes_model_output_through() {
        let s = adapter(Fixed(0.42), 1000).score(&features()).await;
        assert_eq!(s.score, 0.42);
        assert_eq!(s.confidence, Confidence::High);
        assert!(!s.degraded);
        assert_eq!(s.reason_codes, vec!["velocity".to_string()]);
    }

    #[tokio::test]
    async fn cold_start_with_builtin_model() {
        let s = adapter(LogisticModel::default(), 1000).score(&features()).await;
        assert!(s.score < 0.5);
        assert!(!s.degraded);
    }

    #[tokio::test]
    async fn timeout_fails_open() {
        let a = adapter(Slow, 20);
        assert!(matches!(a.try_score(&features()).await, Err(ModelError::Timeout(_))));
        let s = a.score(&features()).await;
        assert!(s.degraded);
        assert_eq!(s.confidence, Confidence::Low);
        assert_eq!(s.score, 0.5);
    }

    #[tokio::test]
    async fn errors_panics_and_garbage_fail_open() {
        for a in [adapter(Broken, 1000), adapter(Panicky, 1000), adapter(Fixed(f64::NAN), 1000), adapter(Fixed(1.7), 1000)] {
            assert!(a.try_score(&features()).await.is_err());
            let s = a.score(&features()).await;
            assert!(s.degraded);
            assert_eq!(s.confidence, Confidence::Low);
        }
    }
}
