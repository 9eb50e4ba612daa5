//! Pipeline coordination: sequencing, the worker pool, and dashboard counters.

mod coordinator;
mod stats;
mod workers;

pub use coordinator::Coordinator;
pub use stats::{spawn_reporter, PipelineStats, StatsSnapshot};
pub use workers::{route, spawn_janitor, Reply, WorkerPool};

use crate::alerts::Alert;
use crate::error::ValidationError;
use crate::model::RiskScore;

/// Outcome of one transaction. Deadline misses are reported as
/// [`PipelineError::Timeout`](crate::error::PipelineError) instead.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineResult {
    Scored(RiskScore, Option<Alert>),
    Rejected(ValidationError),
}

impl PipelineResult {
    pub fn score(&self) -> Option<&RiskScore> {
        match self {
            PipelineResult::Scored(score, _) => Some(score),
            PipelineResult::Rejected(_) => None,
        }
    }

    pub fn alert(&self) -> Option<&Alert> {
        match self {
            PipelineResult::Scored(_, alert) => alert.as_ref(),
            PipelineResult::Rejected(_) => None,
        }
    }
}
