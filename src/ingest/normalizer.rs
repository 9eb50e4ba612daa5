//! Validation and canonicalization of raw records into [`Transaction`]s.

use super::{Channel, RawTransaction, Transaction};
use crate::config::IngestConfig;
use crate::error::ValidationError;
use crate::features::AccountState;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];

pub struct Normalizer {
    skew_tolerance: chrono::Duration,
}

impl Normalizer {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            skew_tolerance: config.skew_tolerance(),
        }
    }

    /// Full normalization against the account's current history (`None` for an
    /// unseen account). Pure: nothing is recorded here.
    pub fn normalize(
        &self,
        raw: &RawTransaction,
        history: Option<&AccountState>,
    ) -> Result<Transaction, ValidationError> {
        let tx = self.canonicalize(raw)?;
        self.check_order(tx, history)
    }

    /// Schema checks that need no account context.
    pub fn canonicalize(&self, raw: &RawTransaction) -> Result<Transaction, ValidationError> {
        let id = required_str(&raw.id, "id")?;
        let account_id = required_str(&raw.account_id, "account_id")?;
        let amount = parse_amount(raw.amount.as_ref().ok_or(ValidationError::MissingField("amount"))?)?;
        let timestamp =
            parse_timestamp(raw.timestamp.as_ref().ok_or(ValidationError::MissingField("timestamp"))?)?;
        let merchant_category = required_str(&raw.merchant_category, "merchant_category")?.to_ascii_uppercase();
        let channel = raw
            .channel
            .as_deref()
            .map(Channel::parse)
            .unwrap_or(Channel::Unknown);

        Ok(Transaction {
            id,
            account_id,
            amount,
            timestamp,
            merchant_category,
            channel,
        })
    }

    /// Out-of-order and duplicate protection. Timestamps inside the skew tolerance
    /// are clamped to the last accepted one so per-account time never goes backwards.
    pub fn check_order(
        &self,
        mut tx: Transaction,
        history: Option<&AccountState>,
    ) -> Result<Transaction, ValidationError> {
        let Some(state) = history else {
            return Ok(tx);
        };
        if let Some(last) = state.last_accepted() {
            if tx.timestamp < crate::features::horizon(last, self.skew_tolerance) {
                return Err(ValidationError::OutOfOrder {
                    account_id: tx.account_id,
                    timestamp: tx.timestamp,
                    last_accepted: last,
                });
            }
            if tx.timestamp < last {
                tx.timestamp = last;
            }
        }
        if state.contains(&tx.id) {
            return Err(ValidationError::Duplicate(tx.id));
        }
        Ok(tx)
    }
}

fn required_str(field: &Option<String>, name: &'static str) -> Result<String, ValidationError> {
    match field.as_deref().map(str::trim) {
        Some(s) if !s.is_empty() => Ok(s.to_string()),
        _ => Err(ValidationError::MissingField(name)),
    }
}

fn parse_amount(v: &Value) -> Result<f64, ValidationError> {
    let amount = match v {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ValidationError::InvalidAmount(n.to_string()))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| ValidationError::InvalidAmount(s.clone()))?,
        Value::Null => return Err(ValidationError::MissingField("amount")),
        other => return Err(ValidationError::InvalidAmount(other.to_string())),
    };
    if !amount.is_finite() {
        return Err(ValidationError::InvalidAmount(amount.to_string()));
    }
    if amount < 0.0 {
        return Err(ValidationError::NegativeAmount(amount));
    }
    Ok(amount)
}

fn parse_timestamp(v: &Value) -> Result<DateTime<Utc>, ValidationError> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| ValidationError::InvalidTimestamp(n.to_string())),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Ok(dt.with_timezone(&Utc));
            }
            NAIVE_FORMATS
                .iter()
                .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
                .map(|naive| Utc.from_utc_datetime(&naive))
                .ok_or_else(|| ValidationError::InvalidTimestamp(s.to_string()))
        }
        Value::Null => Err(ValidationError::MissingField("timestamp")),
        other => Err(ValidationError::InvalidTimestamp(other.to_string())),
    }
}
