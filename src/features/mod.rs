//! Per-account rolling state and feature derivation.

mod account;
mod deriver;
mod stats;

pub use account::{AccountSnapshot, AccountState, Aggregates, TxSummary};
pub use deriver::FeatureDeriver;
pub use stats::RunningStats;

use crate::ingest::Channel;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Model input order. Artifacts name their weights with these.
pub const MODEL_FEATURES: [&str; 8] = [
    "amount",
    "velocity",
    "amount_deviation",
    "amount_zscore",
    "rapid_succession",
    "cold_start",
    "new_category",
    "remote_channel",
];

/// Features for one transaction, computed against the account's history
/// before that transaction was added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub transaction_id: String,
    pub account_id: String,
    pub amount: f64,
    pub channel: Channel,
    /// Transactions in the velocity window, this one included
    pub velocity_count: u32,
    pub rolling_mean: f64,
    pub rolling_std: f64,
    /// Current amount over rolling mean; 1.0 without history
    pub amount_to_mean_ratio: f64,
    pub amount_zscore: f64,
    pub seconds_since_last: Option<f64>,
    /// Prior entries in the retained window
    pub history_len: usize,
    pub cold_start: bool,
    pub new_category: bool,
}

impl FeatureVector {
    /// Scaled inputs in [`MODEL_FEATURES`] order.
    pub fn model_inputs(&self) -> [f64; MODEL_FEATURES.len()] {
        let rapid = self
            .seconds_since_last
            .map(|s| 1.0 / (1.0 + s / 60.0))
            .unwrap_or(0.0);
        [
            self.amount.ln_1p(),
            (self.velocity_count as f64).ln_1p(),
            self.amount_to_mean_ratio.ln(),
            self.amount_zscore,
            rapid,
            flag(self.cold_start),
            flag(self.new_category),
            flag(self.channel.is_remote()),
        ]
    }
}

/// `now - window`, saturating at the earliest representable time.
pub(crate) fn horizon(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn flag(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}
