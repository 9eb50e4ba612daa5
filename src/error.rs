//! Error taxonomy. Validation failures are terminal for one transaction, model
//! failures are absorbed by the adapter, and only coordinator deadlines surface
//! as pipeline errors.

use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Malformed or out-of-order input. Never retried.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("amount is not numeric: {0}")]
    InvalidAmount(String),

    #[error("amount must be non-negative, got {0}")]
    NegativeAmount(f64),

    #[error("unparseable timestamp: {0}")]
    InvalidTimestamp(String),

    #[error(
        "transaction at {timestamp} for account {account_id} is older than last accepted {last_accepted} beyond skew tolerance"
    )]
    OutOfOrder {
        account_id: String,
        timestamp: DateTime<Utc>,
        last_accepted: DateTime<Utc>,
    },

    #[error("transaction {0} already seen for this account")]
    Duplicate(String),
}

/// Model invocation failure. The adapter converts these into degraded scores.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("model call exceeded {0:?}")]
    Timeout(Duration),

    #[error("model failed: {0}")]
    Failed(String),

    #[error("model returned malformed output: {0}")]
    MalformedOutput(String),

    #[error("model task aborted: {0}")]
    Aborted(String),
}

/// Errors the coordinator reports to the caller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("transaction {transaction_id} exceeded pipeline deadline of {deadline:?}")]
    Timeout {
        transaction_id: String,
        deadline: Duration,
    },

    #[error("pipeline workers are shut down")]
    Closed,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("payload encoding error: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("payload encryption failed")]
    Crypto,

    #[error("stored payload too short")]
    Truncated,
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("reading model artifact: {0}")]
    Io(#[from] std::io::Error),

    #[error("parsing model artifact: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("model artifact references unknown feature `{0}`")]
    UnknownFeature(String),
}
