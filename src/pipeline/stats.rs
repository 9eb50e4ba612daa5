//! Pipeline counters and the KPI view the dashboard shows.

use crate::alerts::{Alert, Severity};
use crate::feed::ScoreEvent;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

const TOP_RISK_LEN: usize = 10;

#[derive(Default)]
struct Amounts {
    total: f64,
    flagged: f64,
    top: Vec<ScoreEvent>,
}

#[derive(Default)]
pub struct PipelineStats {
    transactions: AtomicU64,
    rejected: AtomicU64,
    malformed: AtomicU64,
    timeouts: AtomicU64,
    degraded: AtomicU64,
    watch_alerts: AtomicU64,
    high_alerts: AtomicU64,
    critical_alerts: AtomicU64,
    amounts: Mutex<Amounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub transactions: u64,
    /// Includes `malformed`.
    pub rejected: u64,
    /// Input lines that could not be read as any record.
    pub malformed: u64,
    pub timeouts: u64,
    pub degraded: u64,
    pub alerts_watch: u64,
    pub alerts_high: u64,
    pub alerts_critical: u64,
    pub total_amount: f64,
    pub flagged_amount: f64,
    pub average_amount: f64,
    /// Share of scored transactions that raised an alert.
    pub flagged_rate: f64,
    pub top_risk: Vec<ScoreEvent>,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn amounts(&self) -> MutexGuard<'_, Amounts> {
        self.amounts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record_score(&self, event: &ScoreEvent) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
        if event.score.degraded {
            self.degraded.fetch_add(1, Ordering::Relaxed);
        }
        let mut amounts = self.amounts();
        amounts.total += event.amount;
        if event.score.degraded {
            return;
        }
        let top = &mut amounts.top;
        if top.len() < TOP_RISK_LEN || top.last().is_some_and(|m| event.score.score > m.score.score) {
            let at = top.partition_point(|e| e.score.score >= event.score.score);
            top.insert(at, event.clone());
            top.truncate(TOP_RISK_LEN);
        }
    }

    pub fn record_alert(&self, alert: &Alert, amount: f64) {
        let counter = match alert.severity {
            Severity::Watch => &self.watch_alerts,
            Severity::High => &self.high_alerts,
            Severity::Critical => &self.critical_alerts,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.amounts().flagged += amount;
    }

    pub fn record_rejection(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_malformed(&self) {
        self.malformed.fetch_add(1, Ordering::Relaxed);
        self.record_rejection();
    }

    pub fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let transactions = self.transactions.load(Ordering::Relaxed);
        let alerts_watch = self.watch_alerts.load(Ordering::Relaxed);
        let alerts_high = self.high_alerts.load(Ordering::Relaxed);
        let alerts_critical = self.critical_alerts.load(Ordering::Relaxed);
        let amounts = self.amounts();
        let per_tx = |v: f64| if transactions == 0 { 0.0 } else { v / transactions as f64 };
        StatsSnapshot {
            transactions,
            rejected: self.rejected.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            degraded: self.degraded.load(Ordering::Relaxed),
            alerts_watch,
            alerts_high,
            alerts_critical,
            total_amount: amounts.total,
            flagged_amount: amounts.flagged,
            average_amount: per_tx(amounts.total),
            flagged_rate: per_tx((alerts_watch + alerts_high + alerts_critical) as f64),
            top_risk: amounts.top.clone(),
        }
    }
}

/// Log a stats summary every `interval` until aborted.
pub fn spawn_reporter(stats: Arc<PipelineStats>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let s = stats.snapshot();
            info!(
                transactions = s.transactions,
                rejected = s.rejected,
                malformed = s.malformed,
                timeouts = s.timeouts,
                degraded = s.degraded,
                alerts_watch = s.alerts_watch,
                alerts_high = s.alerts_high,
                alerts_critical = s.alerts_critical,
                average_amount = s.average_amount,
                flagged_rate = s.flagged_rate,
                "pipeline stats"
            );
        }
    })
}
