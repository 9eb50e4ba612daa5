//! fraudwatch entrypoint: reads NDJSON transactions (file or stdin), scores them
//! through the worker pool, and writes score and alert events to stdout as NDJSON.
//! Optionally persists events to the encrypted store and forwards them to the
//! dashboard API.

use fraudwatch::{
    config::MonitorConfig,
    feed::{DashboardForwarder, FeedEvent},
    ingest::{read_records, InboundRecord},
    logging::StructuredLogger,
    model::{LogisticModel, RiskModel},
    pipeline::{spawn_janitor, spawn_reporter, Coordinator, WorkerPool},
    storage::{spawn_recorder, SecureStore},
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

const SECRET_PLACEHOLDER: &[u8] = b"fraudwatch-store-secret-placeholder";

static STOP: AtomicBool = AtomicBool::new(false);

fn spawn_printer(mut rx: broadcast::Receiver<FeedEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let stdout = std::io::stdout();
                    if let Err(e) = StructuredLogger::emit_json(&event, &mut stdout.lock()) {
                        warn!(error = %e, "writing output feed failed");
                        break;
                    }
                }
                Err(RecvError::Lagged(n)) => warn!(skipped = n, "stdout feed lagging; events dropped"),
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn open_store(config: &MonitorConfig) -> Result<Arc<SecureStore>, Box<dyn std::error::Error + Send + Sync>> {
    std::fs::create_dir_all(&config.data_dir)?;
    let secret = match std::env::var(&config.storage.secret_env) {
        Ok(s) if !s.is_empty() => s.into_bytes(),
        _ => {
            warn!(env = %config.storage.secret_env, "store secret not set; using placeholder key");
            SECRET_PLACEHOLDER.to_vec()
        }
    };
    let path = config.data_dir.join("scores.db");
    let store = SecureStore::open(&path, &secret)?;
    info!(path = %path.display(), "encrypted store opened");
    Ok(Arc::new(store))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config_path = std::env::var("FRAUDWATCH_CONFIG_PATH")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|_| std::path::PathBuf::from("config.json"));
    let config = MonitorConfig::load(&config_path)?;

    StructuredLogger::init(config.log.json, &config.log.level);
    info!(config = %config_path.display(), "fraudwatch starting");

    let model: Arc<dyn RiskModel> = Arc::new(match &config.model.artifact_path {
        Some(path) => LogisticModel::load(path)?,
        None => LogisticModel::default(),
    });
    let coordinator = Arc::new(Coordinator::new(&config, model));
    info!(model = coordinator.model_name(), "risk model ready");

    let mut sinks = vec![spawn_printer(coordinator.subscribe())];
    if config.storage.enabled {
        sinks.push(spawn_recorder(open_store(&config)?, coordinator.subscribe()));
    }
    if let Some(forwarder) = DashboardForwarder::new(&config.forward) {
        sinks.push(forwarder.spawn(coordinator.subscribe()));
    }

    let mut background = Vec::new();
    if config.pipeline.stats_interval_secs > 0 {
        background.push(spawn_reporter(
            Arc::clone(coordinator.stats()),
            Duration::from_secs(config.pipeline.stats_interval_secs),
        ));
    }
    if config.pipeline.eviction_interval_secs > 0 {
        background.push(spawn_janitor(
            Arc::clone(&coordinator),
            Duration::from_secs(config.pipeline.eviction_interval_secs),
        ));
    }

    let pool = WorkerPool::spawn(
        Arc::clone(&coordinator),
        config.pipeline.workers,
        config.pipeline.queue_capacity,
    );

    let _ = ctrlc::set_handler(|| {
        STOP.store(true, Ordering::Relaxed);
    });

    let mut records = read_records(config.ingest.source.as_deref(), config.pipeline.queue_capacity).await?;
    info!(
        source = ?config.ingest.source,
        workers = config.pipeline.workers,
        "consuming input feed (Ctrl+C to stop)"
    );
    while !STOP.load(Ordering::Relaxed) {
        let record = match tokio::time::timeout(Duration::from_millis(250), records.recv()).await {
            Ok(Some(record)) => record,
            Ok(None) => break,
            Err(_) => continue,
        };
        let outcome = match record {
            InboundRecord::Transaction(raw) => pool.dispatch(raw).await,
            InboundRecord::Acknowledge { acknowledge } => pool
                .acknowledge(&acknowledge)
                .await
                .map(|from| info!(account_id = %acknowledge, from = ?from, "operator acknowledgment")),
            InboundRecord::Unreadable { .. } => {
                pool.coordinator().stats().record_malformed();
                Ok(())
            }
        };
        if let Err(e) = outcome {
            warn!(error = %e, "dispatch failed");
            break;
        }
    }

    info!("input drained; stopping workers");
    pool.shutdown().await;
    for handle in background {
        handle.abort();
        let _ = handle.await;
    }
    let final_stats = coordinator.stats().snapshot();
    drop(coordinator);
    for handle in sinks {
        let _ = handle.await;
    }
    info!(
        transactions = final_stats.transactions,
        rejected = final_stats.rejected,
        malformed = final_stats.malformed,
        timeouts = final_stats.timeouts,
        alerts_critical = final_stats.alerts_critical,
        "fraudwatch stopped"
    );
    Ok(())
}
