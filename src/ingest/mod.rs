//! Transaction ingestion: raw records from the input feed and their canonical form.

mod normalizer;
mod reader;

pub use normalizer::Normalizer;
pub use reader::{read_records, ReadError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Raw record as it arrives on the input feed. Every field is optional here;
/// the normalizer decides what is required.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTransaction {
    #[serde(default, alias = "transaction_id", deserialize_with = "lenient_text")]
    pub id: Option<String>,
    #[serde(default, alias = "user_id", deserialize_with = "lenient_text")]
    pub account_id: Option<String>,
    /// Number or numeric string
    #[serde(default)]
    pub amount: Option<serde_json::Value>,
    /// RFC 3339 string, `YYYY-MM-DD HH:MM:SS` or epoch milliseconds
    #[serde(default, alias = "date")]
    pub timestamp: Option<serde_json::Value>,
    #[serde(default, alias = "merchant", deserialize_with = "lenient_text")]
    pub merchant_category: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub channel: Option<String>,
}

/// Text fields also accept bare numbers (`"user_id": 1234`), which exports often emit.
fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected text or number, found {other}"
        ))),
    }
}

/// One line of the input feed: a transaction, an operator acknowledgment, or a
/// line that could not be read as either.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundRecord {
    Acknowledge { acknowledge: String },
    Transaction(RawTransaction),
    /// Produced by the reader, never parsed.
    #[serde(skip)]
    Unreadable { line: u64, error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Pos,
    Online,
    Atm,
    Transfer,
    Mobile,
    Unknown,
}

impl Channel {
    pub fn parse(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pos" | "card_present" | "in_store" | "instore" | "contactless" => Channel::Pos,
            "online" | "web" | "ecommerce" | "e-commerce" | "card_not_present" | "cnp" => {
                Channel::Online
            }
            "atm" => Channel::Atm,
            "transfer" | "wire" | "p2p" | "ach" => Channel::Transfer,
            "mobile" | "app" | "wallet" => Channel::Mobile,
            _ => Channel::Unknown,
        }
    }

    /// Channels where the card holder is not physically present.
    pub fn is_remote(self) -> bool {
        matches!(self, Channel::Online | Channel::Transfer | Channel::Mobile)
    }
}

/// Canonical transaction. Never mutated after normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub account_id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub merchant_category: String,
    pub channel: Channel,
}
