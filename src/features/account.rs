//! Rolling window of one account's recent transactions.

use super::{FeatureVector, RunningStats};
use crate::config::FeaturesConfig;
use crate::ingest::Transaction;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

const MIN_RATIO: f64 = 1e-3;
const MAX_RATIO: f64 = 1e3;
const ZSCORE_CAP: f64 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxSummary {
    pub id: String,
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
    pub category: String,
}

/// Aggregates over the retained window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aggregates {
    pub count: usize,
    pub mean: f64,
    pub variance: f64,
    /// Entries inside the velocity window as of the last eviction
    pub velocity_count: usize,
}

/// Copy of an account's aggregates for inspection. Readers hold these, never the state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    pub account_id: String,
    pub window_len: usize,
    pub mean: f64,
    pub std_dev: f64,
    pub velocity_count: usize,
    pub last_accepted: Option<DateTime<Utc>>,
    pub total_seen: u64,
}

/// Entries are kept in timestamp order (the normalizer guarantees non-decreasing
/// timestamps per account), so both evictions and the velocity cursor only move
/// forward.
#[derive(Debug, Clone, Default)]
pub struct AccountState {
    window: VecDeque<TxSummary>,
    amounts: RunningStats,
    categories: HashMap<String, u32>,
    ids: HashSet<String>,
    /// Index of the first entry inside the velocity window
    velocity_start: usize,
    last_accepted: Option<DateTime<Utc>>,
    total_seen: u64,
}

impl AccountState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_accepted(&self) -> Option<DateTime<Utc>> {
        self.last_accepted
    }

    /// Never accepted a transaction.
    pub fn is_fresh(&self) -> bool {
        self.last_accepted.is_none()
    }

    pub fn contains(&self, transaction_id: &str) -> bool {
        self.ids.contains(transaction_id)
    }

    pub fn len(&self) -> usize {
        self.window.len()
    }

    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &TxSummary> {
        self.window.iter()
    }

    pub fn aggregates(&self) -> Aggregates {
        Aggregates {
            count: self.window.len(),
            mean: self.amounts.mean(),
            variance: self.amounts.variance(),
            velocity_count: self.window.len() - self.velocity_start,
        }
    }

    /// Drop entries older than the retention window and advance the velocity cursor.
    pub fn evict(&mut self, now: DateTime<Utc>, config: &FeaturesConfig) {
        let horizon = super::horizon(now, config.retention());
        while self.window.front().is_some_and(|e| e.timestamp < horizon) {
            self.pop_front();
        }
        let velocity_horizon = super::horizon(now, config.velocity_window());
        while self.velocity_start < self.window.len()
            && self.window[self.velocity_start].timestamp < velocity_horizon
        {
            self.velocity_start += 1;
        }
    }

    /// Derive features for `tx` from the current history, then fold `tx` into it.
    pub fn admit(&mut self, tx: &Transaction, config: &FeaturesConfig) -> FeatureVector {
        let now = tx.timestamp;
        self.evict(now, config);

        let prior = self.aggregates();
        let cold_start = prior.count == 0;
        let rolling_std = prior.variance.sqrt();

        let ratio = if cold_start {
            1.0
        } else if prior.mean > 0.0 {
            tx.amount / prior.mean
        } else if tx.amount > 0.0 {
            MAX_RATIO
        } else {
            1.0
        };
        let zscore = if prior.count >= 2 && rolling_std > f64::EPSILON {
            ((tx.amount - prior.mean) / rolling_std).clamp(-ZSCORE_CAP, ZSCORE_CAP)
        } else {
            0.0
        };
        let seconds_since_last = self
            .last_accepted
            .map(|last| (now - last).num_milliseconds().max(0) as f64 / 1000.0);
        let new_category = !cold_start && !self.categories.contains_key(&tx.merchant_category);

        let features = FeatureVector {
            transaction_id: tx.id.clone(),
            account_id: tx.account_id.clone(),
            amount: tx.amount,
            channel: tx.channel,
            velocity_count: (prior.velocity_count + 1) as u32,
            rolling_mean: prior.mean,
            rolling_std,
            amount_to_mean_ratio: ratio.clamp(MIN_RATIO, MAX_RATIO),
            amount_zscore: zscore,
            seconds_since_last,
            history_len: prior.count,
            cold_start,
            new_category,
        };

        self.push(TxSummary {
            id: tx.id.clone(),
            amount: tx.amount,
            timestamp: now,
            category: tx.merchant_category.clone(),
        });
        while self.window.len() > config.max_window {
            self.pop_front();
        }
        self.last_accepted = Some(self.last_accepted.map_or(now, |last| last.max(now)));
        self.total_seen += 1;
        features
    }

    pub fn snapshot(&self, account_id: &str) -> AccountSnapshot {
        let agg = self.aggregates();
        AccountSnapshot {
            account_id: account_id.to_string(),
            window_len: agg.count,
            mean: agg.mean,
            std_dev: agg.variance.sqrt(),
            velocity_count: agg.velocity_count,
            last_accepted: self.last_accepted,
            total_seen: self.total_seen,
        }
    }

    fn push(&mut self, entry: TxSummary) {
        self.amounts.add(entry.amount);
        *self.categories.entry(entry.category.clone()).or_insert(0) += 1;
        self.ids.insert(entry.id.clone());
        self.window.push_back(entry);
    }

    fn pop_front(&mut self) {
        let Some(entry) = self.window.pop_front() else {
            return;
        };
        if !self.amounts.remove(entry.amount) {
            self.amounts = RunningStats::from_values(self.window.iter().map(|e| e.amount));
        }
        if let Some(n) = self.categories.get_mut(&entry.category) {
            *n -= 1;
            if *n == 0 {
                self.categories.remove(&entry.category);
            }
        }
        self.ids.remove(&entry.id);
        self.velocity_start = self.velocity_start.saturating_sub(1);
    }
}
