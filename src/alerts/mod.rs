//! Alert tiers and the per-account hysteresis state machine.

mod engine;

pub use engine::AlertEngine;

use crate::config::AlertConfig;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Alert state of an account. Ordered: `Quiet < Watch < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Quiet,
    Watch,
    High,
    Critical,
}

impl Tier {
    pub fn from_score(score: f64, config: &AlertConfig) -> Self {
        if score >= config.critical_threshold {
            Tier::Critical
        } else if score >= config.high_threshold {
            Tier::High
        } else if score >= config.watch_threshold {
            Tier::Watch
        } else {
            Tier::Quiet
        }
    }

    /// Score an account in this tier must drop below to return to quiet.
    pub fn clear_threshold(self, config: &AlertConfig) -> Option<f64> {
        match self {
            Tier::Quiet => None,
            Tier::Watch => Some(config.watch_clear),
            Tier::High => Some(config.high_clear),
            Tier::Critical => Some(config.critical_clear),
        }
    }

    pub fn severity(self) -> Option<Severity> {
        match self {
            Tier::Quiet => None,
            Tier::Watch => Some(Severity::Watch),
            Tier::High => Some(Severity::High),
            Tier::Critical => Some(Severity::Critical),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Watch,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Watch => "watch",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,
    pub account_id: String,
    pub transaction_id: String,
    pub severity: Severity,
    /// Tier the account was in before this alert
    pub previous: Tier,
    pub score: f64,
    pub reason_codes: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub suppressed_until: DateTime<Utc>,
}
