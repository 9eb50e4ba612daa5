//! Fixed-size worker pool. Each account hashes to exactly one worker, and each
//! worker drains its queue in order, so same-account transactions are processed
//! in submission order while different accounts run in parallel.

use super::{Coordinator, PipelineResult};
use crate::alerts::Tier;
use crate::error::PipelineError;
use crate::ingest::RawTransaction;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type Reply = Result<PipelineResult, PipelineError>;

enum Job {
    Score {
        raw: RawTransaction,
        reply: Option<oneshot::Sender<Reply>>,
    },
    Acknowledge {
        account_id: String,
        reply: oneshot::Sender<Option<Tier>>,
    },
}

pub struct WorkerPool {
    coordinator: Arc<Coordinator>,
    queues: Vec<mpsc::Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` tasks, each with its own queue of `queue_capacity` jobs.
    pub fn spawn(coordinator: Arc<Coordinator>, workers: usize, queue_capacity: usize) -> Self {
        let workers = workers.max(1);
        let mut queues = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for index in 0..workers {
            let (tx, rx) = mpsc::channel(queue_capacity.max(1));
            queues.push(tx);
            handles.push(tokio::spawn(run(index, Arc::clone(&coordinator), rx)));
        }
        info!(workers, queue_capacity, "worker pool started");
        Self {
            coordinator,
            queues,
            workers: handles,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    fn queue_for(&self, account_id: &str) -> &mpsc::Sender<Job> {
        &self.queues[route(account_id, self.queues.len())]
    }

    async fn enqueue(&self, account_id: &str, job: Job) -> Result<(), PipelineError> {
        self.queue_for(account_id)
            .send(job)
            .await
            .map_err(|_| PipelineError::Closed)
    }

    /// Queue a transaction and get a handle to its result. Waits for queue space.
    pub async fn submit(&self, raw: RawTransaction) -> Result<oneshot::Receiver<Reply>, PipelineError> {
        let (reply, rx) = oneshot::channel();
        let account_id = routing_key(&raw).to_string();
        self.enqueue(&account_id, Job::Score { raw, reply: Some(reply) })
            .await?;
        Ok(rx)
    }

    /// Queue a transaction whose outcome is only observed through the output feed.
    pub async fn dispatch(&self, raw: RawTransaction) -> Result<(), PipelineError> {
        let account_id = routing_key(&raw).to_string();
        self.enqueue(&account_id, Job::Score { raw, reply: None }).await
    }

    pub async fn submit_and_wait(&self, raw: RawTransaction) -> Reply {
        self.submit(raw).await?.await.map_err(|_| PipelineError::Closed)?
    }

    /// Acknowledge through the account's worker so it lands between that account's
    /// transactions in submission order.
    pub async fn acknowledge(&self, account_id: &str) -> Result<Option<Tier>, PipelineError> {
        let account_id = account_id.trim();
        let (reply, rx) = oneshot::channel();
        self.enqueue(
            account_id,
            Job::Acknowledge {
                account_id: account_id.to_string(),
                reply,
            },
        )
        .await?;
        rx.await.map_err(|_| PipelineError::Closed)
    }

    /// Close the queues and wait for every queued job to finish.
    pub async fn shutdown(self) {
        drop(self.queues);
        for (index, handle) in self.workers.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!(worker = index, error = %e, "worker ended abnormally");
            }
        }
        info!("worker pool stopped");
    }
}

async fn run(index: usize, coordinator: Arc<Coordinator>, mut rx: mpsc::Receiver<Job>) {
    while let Some(job) = rx.recv().await {
        match job {
            Job::Score { raw, reply } => {
                let result = coordinator.process(&raw).await;
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
            Job::Acknowledge { account_id, reply } => {
                let _ = reply.send(coordinator.acknowledge(&account_id));
            }
        }
    }
    debug!(worker = index, "worker queue closed");
}

/// The account key the normalizer will store this record under.
fn routing_key(raw: &RawTransaction) -> &str {
    raw.account_id.as_deref().map(str::trim).unwrap_or_default()
}

/// Consistent worker index for an account: SHA-256 of the trimmed id, modulo pool size.
pub fn route(account_id: &str, workers: usize) -> usize {
    let digest = ring::digest::digest(&ring::digest::SHA256, account_id.trim().as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_ref()[..8]);
    (u64::from_be_bytes(head) % workers.max(1) as u64) as usize
}

/// Periodically evict idle accounts until aborted.
pub fn spawn_janitor(coordinator: Arc<Coordinator>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let evicted = coordinator.evict_idle();
            if evicted > 0 {
                info!(evicted, "idle accounts evicted");
            }
        }
    })
}
