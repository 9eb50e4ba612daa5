//! End-to-end scenarios through the coordinator and the worker pool.

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use fraudwatch::{
    alerts::{Severity, Tier},
    config::MonitorConfig,
    error::{ModelError, PipelineError, ValidationError},
    feed::FeedEvent,
    ingest::RawTransaction,
    model::{Confidence, LogisticModel, ModelRequest, ModelResponse, RiskModel},
    pipeline::{route, Coordinator, PipelineResult, WorkerPool},
};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap()
}

fn raw(id: &str, account: &str, amount: f64, at: DateTime<Utc>) -> RawTransaction {
    serde_json::from_value(json!({
        "id": id,
        "account_id": account,
        "amount": amount,
        "timestamp": at.to_rfc3339(),
        "merchant_category": "grocery",
        "channel": "pos",
    }))
    .unwrap()
}

/// Returns queued scores in order, then 0.1.
struct Scripted(Mutex<VecDeque<f64>>);

impl Scripted {
    fn new(scores: &[f64]) -> Arc<Self> {
        Arc::new(Self(Mutex::new(scores.iter().copied().collect())))
    }
}

impl RiskModel for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    fn infer(&self, _: &ModelRequest) -> Result<ModelResponse, ModelError> {
        let score = self.0.lock().unwrap().pop_front().unwrap_or(0.1);
        Ok(ModelResponse {
            score,
            confidence: Confidence::High,
            drivers: vec!["amount_deviation".into()],
        })
    }
}

struct Sleepy(Duration);

impl RiskModel for Sleepy {
    fn name(&self) -> &str {
        "sleepy"
    }

    fn infer(&self, _: &ModelRequest) -> Result<ModelResponse, ModelError> {
        std::thread::sleep(self.0);
        Ok(ModelResponse {
            score: 0.99,
            confidence: Confidence::High,
            drivers: vec![],
        })
    }
}

/// Stalls on the transaction named `block`; alerts on `hot`.
struct Gate(Duration);

impl RiskModel for Gate {
    fn name(&self) -> &str {
        "gate"
    }

    fn infer(&self, request: &ModelRequest) -> Result<ModelResponse, ModelError> {
        if request.transaction_id == "block" {
            std::thread::sleep(self.0);
        }
        Ok(ModelResponse {
            score: if request.transaction_id == "hot" { 0.95 } else { 0.1 },
            confidence: Confidence::High,
            drivers: vec![],
        })
    }
}

fn logistic() -> Coordinator {
    Coordinator::new(&MonitorConfig::default(), Arc::new(LogisticModel::default()))
}

#[tokio::test]
async fn cold_start_then_spike_raises_critical() {
    let c = logistic();
    let mut feed = c.subscribe();

    let first = c.process(&raw("t1", "A", 100.0, t0())).await.unwrap();
    let PipelineResult::Scored(score, alert) = first else {
        panic!("first transaction rejected");
    };
    assert!(score.score < 0.5, "cold start scored {}", score.score);
    assert_eq!(score.confidence, Confidence::Low);
    assert!(alert.is_none());

    let spike = c
        .process(&raw("t2", "A", 5000.0, t0() + ChronoDuration::seconds(30)))
        .await
        .unwrap();
    let score = spike.score().unwrap();
    assert!(score.score >= 0.9, "spike scored {}", score.score);
    let alert = spike.alert().expect("critical alert");
    assert_eq!(alert.severity, Severity::Critical);
    assert!(alert.reason_codes.contains("amount_deviation"));
    assert_eq!(c.alert_state("A"), Tier::Critical);

    let kinds: Vec<&str> = std::iter::from_fn(|| feed.try_recv().ok())
        .map(|ev| match ev {
            FeedEvent::Score(_) => "score",
            FeedEvent::Alert(_) => "alert",
        })
        .collect();
    assert_eq!(kinds, ["score", "score", "alert"]);

    let stats = c.stats().snapshot();
    assert_eq!(stats.transactions, 2);
    assert_eq!(stats.alerts_critical, 1);
    assert_eq!(stats.flagged_amount, 5000.0);
}

#[tokio::test]
async fn critical_dedup_then_hysteresis_then_quiet() {
    let c = Coordinator::new(&MonitorConfig::default(), Scripted::new(&[0.95, 0.92, 0.4, 0.2]));
    let at = |s| t0() + ChronoDuration::seconds(s);

    let r = c.process(&raw("t1", "A", 10.0, at(0))).await.unwrap();
    assert_eq!(r.alert().unwrap().severity, Severity::Critical);

    let r = c.process(&raw("t2", "A", 10.0, at(10))).await.unwrap();
    assert!(r.alert().is_none(), "0.92 deduped");

    let r = c.process(&raw("t3", "A", 10.0, at(20))).await.unwrap();
    assert!(r.alert().is_none());
    assert_eq!(c.alert_state("A"), Tier::Critical);

    let r = c.process(&raw("t4", "A", 10.0, at(30))).await.unwrap();
    assert!(r.alert().is_none());
    assert_eq!(c.alert_state("A"), Tier::Quiet);
}

#[tokio::test]
async fn out_of_order_is_rejected_and_state_untouched() {
    let c = logistic();
    c.process(&raw("t1", "A", 20.0, t0())).await.unwrap();
    let before = c.account_snapshot("A").unwrap();

    let late = c
        .process(&raw("t0", "A", 20.0, t0() - ChronoDuration::seconds(120)))
        .await
        .unwrap();
    assert!(matches!(
        late,
        PipelineResult::Rejected(ValidationError::OutOfOrder { .. })
    ));
    let after = c.account_snapshot("A").unwrap();
    assert_eq!(*before, *after);
    assert_eq!(c.stats().snapshot().rejected, 1);
}

#[tokio::test]
async fn skewed_timestamp_is_clamped_and_duplicates_rejected() {
    let c = logistic();
    c.process(&raw("t1", "A", 20.0, t0())).await.unwrap();
    let skewed = c
        .process(&raw("t2", "A", 20.0, t0() - ChronoDuration::seconds(10)))
        .await
        .unwrap();
    assert!(skewed.score().is_some());
    assert_eq!(c.account_snapshot("A").unwrap().last_accepted, Some(t0()));

    let dup = c
        .process(&raw("t2", "A", 20.0, t0() + ChronoDuration::seconds(5)))
        .await
        .unwrap();
    assert_eq!(dup, PipelineResult::Rejected(ValidationError::Duplicate("t2".into())));
}

#[tokio::test]
async fn malformed_record_never_creates_account() {
    let c = logistic();
    let bad: RawTransaction = serde_json::from_value(json!({
        "id": "t1",
        "account_id": "ghost",
        "amount": "-5",
        "timestamp": t0().to_rfc3339(),
        "merchant_category": "x",
    }))
    .unwrap();
    let r = c.process(&bad).await.unwrap();
    assert!(matches!(r, PipelineResult::Rejected(ValidationError::NegativeAmount(_))));
    assert!(c.account_snapshot("ghost").is_none());
}

#[tokio::test]
async fn model_timeout_fails_open() {
    let mut config = MonitorConfig::default();
    config.model.timeout_ms = 20;
    let c = Coordinator::new(&config, Arc::new(Sleepy(Duration::from_millis(300))));

    let r = c.process(&raw("t1", "A", 10.0, t0())).await.unwrap();
    let score = r.score().unwrap();
    assert!(score.degraded);
    assert_eq!(score.confidence, Confidence::Low);
    assert_eq!(score.score, config.model.fallback_score);
    assert!(r.alert().is_none());
    assert_eq!(c.stats().snapshot().degraded, 1);
}

#[tokio::test]
async fn deadline_miss_reports_timeout_but_keeps_state() {
    let mut config = MonitorConfig::default();
    config.model.timeout_ms = 2_000;
    config.pipeline.deadline_ms = 50;
    let c = Coordinator::new(&config, Arc::new(Sleepy(Duration::from_millis(400))));

    let err = c.process(&raw("t1", "A", 10.0, t0())).await.unwrap_err();
    assert!(matches!(err, PipelineError::Timeout { ref transaction_id, .. } if transaction_id == "t1"));
    assert_eq!(c.account_snapshot("A").unwrap().window_len, 1);
    assert_eq!(c.alert_state("A"), Tier::Quiet);
    assert_eq!(c.stats().snapshot().timeouts, 1);
}

#[tokio::test]
async fn idle_accounts_are_evicted_against_event_time() {
    let c = logistic();
    c.process(&raw("t1", "old", 10.0, t0())).await.unwrap();
    c.process(&raw("t2", "new", 10.0, t0() + ChronoDuration::days(2)))
        .await
        .unwrap();
    assert_eq!(c.evict_idle(), 1);
    assert!(c.account_snapshot("old").is_none());
    assert!(c.account_snapshot("new").is_some());

    let back = c
        .process(&raw("t3", "old", 10.0, t0() + ChronoDuration::days(2)))
        .await
        .unwrap();
    assert_eq!(back.score().unwrap().confidence, Confidence::Low, "cold start again");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn worker_pool_preserves_per_account_order() {
    let mut config = MonitorConfig::default();
    config.ingest.skew_tolerance_secs = 0;
    let coordinator = Arc::new(Coordinator::new(&config, Arc::new(LogisticModel::default())));
    let pool = WorkerPool::spawn(Arc::clone(&coordinator), 4, 2);

    let mut pending = Vec::new();
    for i in 0..25 {
        for acct in ["a", "b", "c", "d", "e"] {
            let at = t0() + ChronoDuration::seconds(60 * i);
            let rx = pool
                .submit(raw(&format!("{acct}-{i}"), acct, 10.0 + i as f64, at))
                .await
                .unwrap();
            pending.push(rx);
        }
    }
    for rx in pending {
        let result = rx.await.unwrap().unwrap();
        assert!(result.score().is_some(), "{result:?}");
    }
    for acct in ["a", "b", "c", "d", "e"] {
        let snap = coordinator.account_snapshot(acct).unwrap();
        assert_eq!(snap.total_seen, 25);
        assert_eq!(snap.last_accepted, Some(t0() + ChronoDuration::seconds(60 * 24)));
    }
    pool.shutdown().await;
}

#[tokio::test]
async fn acknowledgment_through_pool_resets_alert_state() {
    let coordinator = Arc::new(Coordinator::new(&MonitorConfig::default(), Scripted::new(&[0.95, 0.95])));
    let pool = WorkerPool::spawn(Arc::clone(&coordinator), 2, 8);

    let first = pool.submit_and_wait(raw("t1", "A", 10.0, t0())).await.unwrap();
    assert!(first.alert().is_some());
    assert_eq!(pool.acknowledge("A").await.unwrap(), Some(Tier::Critical));
    assert_eq!(coordinator.alert_state("A"), Tier::Quiet);

    let again = pool
        .submit_and_wait(raw("t2", "A", 10.0, t0() + ChronoDuration::seconds(5)))
        .await
        .unwrap();
    assert_eq!(again.alert().unwrap().previous, Tier::Quiet);
    pool.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn padded_account_ids_share_one_worker() {
    let mut config = MonitorConfig::default();
    config.ingest.skew_tolerance_secs = 0;
    config.model.timeout_ms = 5_000;
    let coordinator = Arc::new(Coordinator::new(&config, Arc::new(Gate(Duration::from_millis(200)))));
    let pool = WorkerPool::spawn(Arc::clone(&coordinator), 4, 8);

    // hold up the queue account A routes to
    let blocker = (0..)
        .map(|i| format!("b{i}"))
        .find(|b| route(b, 4) == route("A", 4))
        .unwrap();
    let held = pool.submit(raw("block", &blocker, 10.0, t0())).await.unwrap();

    let ids = ["A", " A", "A ", "\tA", " A\n"];
    let mut pending = Vec::new();
    for (i, id) in ids.iter().enumerate() {
        let tx = if i == ids.len() - 1 { "hot".to_string() } else { format!("t{i}") };
        let at = t0() + ChronoDuration::minutes(i as i64);
        pending.push(pool.submit(raw(&tx, id, 10.0, at)).await.unwrap());
    }
    held.await.unwrap().unwrap();
    for rx in pending {
        let result = rx.await.unwrap().unwrap();
        assert!(result.score().is_some(), "{result:?}");
    }
    let snap = coordinator.account_snapshot("A").unwrap();
    assert_eq!(snap.total_seen, ids.len() as u64);
    assert_eq!(coordinator.alert_state("A"), Tier::Critical);

    assert_eq!(pool.acknowledge(" A ").await.unwrap(), Some(Tier::Critical));
    assert_eq!(coordinator.alert_state("A"), Tier::Quiet);
    pool.shutdown().await;
}

#[tokio::test]
async fn unbounded_budgets_do_not_overflow_the_clock() {
    let mut config = MonitorConfig::default();
    config.pipeline.deadline_ms = u64::MAX;
    config.model.timeout_ms = u64::MAX;
    config.features.retention_secs = u64::MAX;
    config.alerts.suppression_secs = u64::MAX;
    let c = Coordinator::new(&config, Scripted::new(&[0.95]));

    let r = c.process(&raw("t1", "A", 10.0, t0())).await.unwrap();
    assert!(!r.score().unwrap().degraded);
    assert_eq!(r.alert().unwrap().suppressed_until, DateTime::<Utc>::MAX_UTC);
    c.process(&raw("t2", "A", 10.0, t0() + ChronoDuration::days(400)))
        .await
        .unwrap();
    assert_eq!(c.evict_idle(), 0);
    assert_eq!(c.account_snapshot("A").unwrap().window_len, 2);
}
