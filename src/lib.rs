//! fraudwatch: streaming transaction risk scoring and alerting.
//!
//! Modular structure:
//! - [`ingest`]: Raw records, validation and canonicalization
//! - [`features`]: Per-account rolling windows and feature derivation
//! - [`model`]: Frozen risk model behind a fail-open adapter
//! - [`alerts`]: Per-account alert tiers with hysteresis and suppression
//! - [`pipeline`]: Coordinator, worker pool and dashboard statistics
//! - [`feed`]: Score/alert output feed and dashboard forwarding
//! - [`storage`]: Encrypted local score/alert store
//! - [`logging`]: Structured logging

pub mod alerts;
pub mod config;
pub mod error;
pub mod features;
pub mod feed;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod storage;

pub use alerts::{Alert, AlertEngine, Severity, Tier};
pub use config::MonitorConfig;
pub use error::{ModelError, PipelineError, ValidationError};
pub use features::{FeatureDeriver, FeatureVector};
pub use feed::{FeedEvent, OutputFeed, ScoreEvent};
pub use ingest::{Normalizer, RawTransaction, Transaction};
pub use logging::StructuredLogger;
pub use model::{LogisticModel, ModelAdapter, RiskModel, RiskScore};
pub use pipeline::{Coordinator, PipelineResult, WorkerPool};
pub use storage::SecureStore;
