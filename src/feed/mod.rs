//! Output feed: score and alert events for the dashboard. Publishing never waits
//! on subscribers; a subscriber that falls behind loses the oldest events.

mod forward;

pub use forward::DashboardForwarder;

use crate::alerts::Alert;
use crate::ingest::{Channel, Transaction};
use crate::model::RiskScore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// A score with enough transaction context to stand on its own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreEvent {
    #[serde(flatten)]
    pub score: RiskScore,
    pub amount: f64,
    pub merchant_category: String,
    pub channel: Channel,
    pub transaction_time: DateTime<Utc>,
}

impl ScoreEvent {
    pub fn new(score: RiskScore, tx: &Transaction) -> Self {
        Self {
            score,
            amount: tx.amount,
            merchant_category: tx.merchant_category.clone(),
            channel: tx.channel,
            transaction_time: tx.timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FeedEvent {
    Score(ScoreEvent),
    Alert(Alert),
}

#[derive(Clone)]
pub struct OutputFeed {
    tx: broadcast::Sender<FeedEvent>,
}

impl OutputFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: FeedEvent) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.tx.subscribe()
    }
}
