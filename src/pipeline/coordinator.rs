//! Per-transaction sequencing: normalize, derive, score, evaluate, publish.
//!
//! Account state mutated by derivation is never rolled back, even when the
//! transaction later misses its deadline.

use super::{PipelineResult, PipelineStats};
use crate::alerts::{AlertEngine, Tier};
use crate::config::MonitorConfig;
use crate::error::{PipelineError, ValidationError};
use crate::features::{AccountSnapshot, FeatureDeriver};
use crate::feed::{FeedEvent, OutputFeed, ScoreEvent};
use crate::ingest::{Normalizer, RawTransaction};
use crate::model::{ModelAdapter, RiskModel};
use chrono::{DateTime, TimeZone, Utc};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub struct Coordinator {
    normalizer: Normalizer,
    deriver: FeatureDeriver,
    adapter: ModelAdapter,
    alerts: AlertEngine,
    feed: OutputFeed,
    stats: Arc<PipelineStats>,
    deadline: Duration,
    retention: chrono::Duration,
    /// Newest accepted transaction time, epoch millis. Clock for idle eviction.
    watermark: AtomicI64,
}

impl Coordinator {
    pub fn new(config: &MonitorConfig, model: Arc<dyn RiskModel>) -> Self {
        Self {
            normalizer: Normalizer::new(&config.ingest),
            deriver: FeatureDeriver::new(config.features.clone()),
            adapter: ModelAdapter::new(model, &config.model),
            alerts: AlertEngine::new(config.alerts.clone()),
            feed: OutputFeed::new(config.pipeline.feed_capacity),
            stats: Arc::new(PipelineStats::new()),
            deadline: config.pipeline.deadline(),
            retention: config.features.retention(),
            watermark: AtomicI64::new(i64::MIN),
        }
    }

    /// Run one raw record through the pipeline.
    ///
    /// Callers that need per-account ordering must not run two `process` calls
    /// for the same account concurrently; the worker pool guarantees this.
    pub async fn process(&self, raw: &RawTransaction) -> Result<PipelineResult, PipelineError> {
        let started = Instant::now();
        // a budget past the clock's range means no deadline
        let deadline = tokio::time::Instant::now().checked_add(self.deadline);

        let tx = match self.normalizer.canonicalize(raw) {
            Ok(tx) => tx,
            Err(e) => return Ok(self.reject(raw, e)),
        };
        let derived = self
            .deriver
            .derive_with(tx, |tx, history| self.normalizer.check_order(tx, history));
        let (tx, features) = match derived {
            Ok(pair) => pair,
            Err(e) => return Ok(self.reject(raw, e)),
        };
        self.watermark
            .fetch_max(tx.timestamp.timestamp_millis(), Ordering::Relaxed);

        let work = async {
            let score = self.adapter.score(&features).await;
            let alert = self.alerts.evaluate(&score);
            (score, alert)
        };
        let scored = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, work).await,
            None => Ok(work.await),
        };
        let Ok((score, alert)) = scored else {
            self.stats.record_timeout();
            warn!(
                transaction_id = %tx.id,
                account_id = %tx.account_id,
                deadline_ms = self.deadline.as_millis() as u64,
                "pipeline deadline exceeded; score abandoned"
            );
            return Err(PipelineError::Timeout {
                transaction_id: tx.id,
                deadline: self.deadline,
            });
        };

        let event = ScoreEvent::new(score.clone(), &tx);
        self.stats.record_score(&event);
        self.feed.publish(FeedEvent::Score(event));
        if let Some(alert) = &alert {
            self.stats.record_alert(alert, tx.amount);
            self.feed.publish(FeedEvent::Alert(alert.clone()));
        }
        debug!(
            transaction_id = %tx.id,
            score = score.score,
            elapsed_us = started.elapsed().as_micros() as u64,
            "transaction scored"
        );
        Ok(PipelineResult::Scored(score, alert))
    }

    fn reject(&self, raw: &RawTransaction, error: ValidationError) -> PipelineResult {
        self.stats.record_rejection();
        warn!(
            transaction_id = raw.id.as_deref().unwrap_or("-"),
            account_id = raw.account_id.as_deref().unwrap_or("-"),
            error = %error,
            "transaction rejected"
        );
        PipelineResult::Rejected(error)
    }

    /// Operator acknowledgment from the dashboard. Returns the tier the account left.
    pub fn acknowledge(&self, account_id: &str) -> Option<Tier> {
        self.alerts.acknowledge(account_id.trim())
    }

    pub fn account_snapshot(&self, account_id: &str) -> Option<Arc<AccountSnapshot>> {
        self.deriver.snapshot(account_id)
    }

    pub fn alert_state(&self, account_id: &str) -> Tier {
        self.alerts.state_of(account_id)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.feed.subscribe()
    }

    pub fn stats(&self) -> &Arc<PipelineStats> {
        &self.stats
    }

    pub fn model_name(&self) -> &str {
        self.adapter.model_name()
    }

    /// Newest accepted transaction time, if anything has been accepted.
    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        match self.watermark.load(Ordering::Relaxed) {
            i64::MIN => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    /// Evict accounts idle for longer than the retention window, measured against
    /// the newest transaction time seen, and expire alert tracks whose suppression
    /// ended more than a retention window ago on the wall clock (the clock scores
    /// are stamped with). Returns how many accounts were dropped.
    pub fn evict_idle(&self) -> usize {
        let expired = self
            .alerts
            .expire_before(crate::features::horizon(Utc::now(), self.retention));
        if expired > 0 {
            debug!(expired, "stale alert tracks expired");
        }
        let Some(now) = self.watermark() else {
            return 0;
        };
        self.deriver.evict_idle(now).len()
    }
}
