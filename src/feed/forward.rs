//! Dashboard forwarder: post score and alert events to the dashboard's ingest API.

use super::{FeedEvent, ScoreEvent};
use crate::alerts::Alert;
use crate::config::ForwardConfig;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Payloads for the dashboard API.
#[derive(Serialize)]
struct ScorePayload<'a> {
    transaction_id: &'a str,
    account_id: &'a str,
    risk_score: f64,
    confidence: crate::model::Confidence,
    degraded: bool,
    amount: f64,
    merchant: &'a str,
    date: String,
}

#[derive(Serialize)]
struct AlertPayload<'a> {
    alert_id: &'a str,
    account_id: &'a str,
    transaction_id: &'a str,
    severity: &'a str,
    risk_score: f64,
    reason_codes: Vec<&'a str>,
    created_at: String,
    suppressed_until: String,
}

impl<'a> From<&'a ScoreEvent> for ScorePayload<'a> {
    fn from(ev: &'a ScoreEvent) -> Self {
        Self {
            transaction_id: &ev.score.transaction_id,
            account_id: &ev.score.account_id,
            risk_score: ev.score.score,
            confidence: ev.score.confidence,
            degraded: ev.score.degraded,
            amount: ev.amount,
            merchant: &ev.merchant_category,
            date: ev.transaction_time.to_rfc3339(),
        }
    }
}

impl<'a> From<&'a Alert> for AlertPayload<'a> {
    fn from(a: &'a Alert) -> Self {
        Self {
            alert_id: &a.alert_id,
            account_id: &a.account_id,
            transaction_id: &a.transaction_id,
            severity: a.severity.as_str(),
            risk_score: a.score,
            reason_codes: a.reason_codes.iter().map(String::as_str).collect(),
            created_at: a.created_at.to_rfc3339(),
            suppressed_until: a.suppressed_until.to_rfc3339(),
        }
    }
}

pub struct DashboardForwarder {
    client: reqwest::Client,
    base_url: String,
}

impl DashboardForwarder {
    /// `None` when forwarding is disabled or no endpoint is configured.
    pub fn new(config: &ForwardConfig) -> Option<Self> {
        if !config.enabled {
            return None;
        }
        let endpoint = config.endpoint.as_ref()?.trim_end_matches('/');
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .ok()?;
        Some(Self {
            client,
            base_url: endpoint.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<(), String> {
        let url = format!("{}{}", self.base_url, path);
        let res = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;
        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(format!("{} {}", status, text));
        }
        Ok(())
    }

    pub async fn forward(&self, event: &FeedEvent) -> Result<(), String> {
        match event {
            FeedEvent::Score(ev) => self.post("/api/v1/scores", &ScorePayload::from(ev)).await,
            FeedEvent::Alert(a) => self.post("/api/v1/alerts", &AlertPayload::from(a)).await,
        }
    }

    /// Forward every feed event until the feed closes. Failures are logged and dropped.
    pub fn spawn(self, mut rx: broadcast::Receiver<FeedEvent>) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(endpoint = %self.base_url, "dashboard forwarding enabled");
            loop {
                let event = match rx.recv().await {
                    Ok(ev) => ev,
                    Err(RecvError::Lagged(n)) => {
                        warn!(skipped = n, "dashboard forwarder lagging; events dropped");
                        continue;
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(e) = self.forward(&event).await {
                    warn!(error = %e, "dashboard forward failed");
                } else {
                    debug!("event forwarded");
                }
            }
        })
    }
}
