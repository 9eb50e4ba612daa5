//! Risk model boundary: a frozen model behind [`RiskModel`], wrapped by the
//! fail-open [`ModelAdapter`].

mod adapter;
mod logistic;

pub use adapter::ModelAdapter;
pub use logistic::{LogisticModel, ModelArtifact};

use crate::error::ModelError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// What the model sees: ordered inputs plus metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelRequest {
    pub inputs: Vec<f64>,
    pub feature_names: &'static [&'static str],
    pub transaction_id: String,
    pub account_id: String,
    pub history_len: usize,
    pub cold_start: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    pub score: f64,
    pub confidence: Confidence,
    /// Feature names driving the score, strongest first
    pub drivers: Vec<String>,
}

/// Capability every scoring model implements. Calls may block; the adapter runs
/// them off the async runtime.
pub trait RiskModel: Send + Sync {
    fn name(&self) -> &str;
    fn infer(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScore {
    pub transaction_id: String,
    pub account_id: String,
    pub score: f64,
    pub confidence: Confidence,
    /// Produced by the fail-open path rather than the model
    pub degraded: bool,
    pub reason_codes: Vec<String>,
    pub computed_at: DateTime<Utc>,
}
