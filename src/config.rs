//! Monitor configuration. Every section has defaults, so a partial JSON file is enough.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Data directory (encrypted score/alert store)
    pub data_dir: PathBuf,
    /// Input feed and normalization
    pub ingest: IngestConfig,
    /// Rolling per-account windows
    pub features: FeaturesConfig,
    /// Frozen model artifact and call budget
    pub model: ModelConfig,
    /// Tier thresholds, hysteresis and suppression
    pub alerts: AlertConfig,
    /// Worker pool and deadlines
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
    /// Optional HTTP forwarding to the dashboard
    pub forward: ForwardConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// NDJSON source file; stdin when unset
    pub source: Option<PathBuf>,
    /// How far behind the last accepted timestamp a transaction may be (seconds)
    pub skew_tolerance_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeaturesConfig {
    /// Entries older than this are evicted from the rolling window (seconds)
    pub retention_secs: u64,
    /// Hard cap on entries per account window
    pub max_window: usize,
    /// Lookback for the velocity count (seconds)
    pub velocity_window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// JSON logistic model artifact; built-in weights when unset or missing
    pub artifact_path: Option<PathBuf>,
    /// Latency budget for one model call (milliseconds)
    pub timeout_ms: u64,
    /// Sentinel score returned on model failure
    pub fallback_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub watch_threshold: f64,
    pub high_threshold: f64,
    pub critical_threshold: f64,
    /// Score below which a watch account returns to quiet
    pub watch_clear: f64,
    pub high_clear: f64,
    pub critical_clear: f64,
    /// Repeat alerts at the same tier are muted for this long (seconds)
    pub suppression_secs: u64,
    /// Let fail-open scores drive tier transitions
    pub escalate_on_degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    /// Per-worker queue depth
    pub queue_capacity: usize,
    /// Overall per-transaction deadline (milliseconds)
    pub deadline_ms: u64,
    /// Buffered events per output feed subscriber
    pub feed_capacity: usize,
    /// Stats log interval (seconds); 0 disables
    pub stats_interval_secs: u64,
    /// Idle account sweep interval (seconds); 0 disables
    pub eviction_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub enabled: bool,
    /// Environment variable holding the store secret
    pub secret_env: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwardConfig {
    pub enabled: bool,
    pub endpoint: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".fraudwatch"),
            ingest: IngestConfig::default(),
            features: FeaturesConfig::default(),
            model: ModelConfig::default(),
            alerts: AlertConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            forward: ForwardConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source: None,
            skew_tolerance_secs: 30,
        }
    }
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            retention_secs: 24 * 60 * 60,
            max_window: 256,
            velocity_window_secs: 10 * 60,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            artifact_path: None,
            timeout_ms: 250,
            fallback_score: 0.5,
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            watch_threshold: 0.5,
            high_threshold: 0.75,
            critical_threshold: 0.9,
            watch_clear: 0.35,
            high_clear: 0.3,
            critical_clear: 0.25,
            suppression_secs: 15 * 60,
            escalate_on_degraded: false,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
            deadline_ms: 2000,
            feed_capacity: 4096,
            stats_interval_secs: 30,
            eviction_interval_secs: 300,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            secret_env: "FRAUDWATCH_STORE_SECRET".to_string(),
        }
    }
}

impl Default for ForwardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_secs: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: true,
        }
    }
}

/// Longest window any time-based setting may span.
pub const MAX_WINDOW_SECS: u64 = 10 * 365 * 86_400;
/// Longest model timeout or pipeline deadline.
pub const MAX_BUDGET_MS: u64 = 86_400_000;

/// Saturating seconds → `chrono::Duration`. Unvalidated configs stay usable.
fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

impl IngestConfig {
    pub fn skew_tolerance(&self) -> chrono::Duration {
        seconds(self.skew_tolerance_secs)
    }
}

impl FeaturesConfig {
    pub fn retention(&self) -> chrono::Duration {
        seconds(self.retention_secs)
    }

    pub fn velocity_window(&self) -> chrono::Duration {
        seconds(self.velocity_window_secs)
    }
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl AlertConfig {
    pub fn suppression(&self) -> chrono::Duration {
        seconds(self.suppression_secs)
    }
}

impl PipelineConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_millis(self.deadline_ms)
    }
}

impl MonitorConfig {
    /// Load from a JSON file if present, otherwise defaults. A file that exists but
    /// does not parse or validate is an error.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let config: MonitorConfig = serde_json::from_str(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let a = &self.alerts;
        let unit = |name: &str, v: f64| {
            if (0.0..=1.0).contains(&v) {
                Ok(())
            } else {
                Err(ConfigError::Invalid(format!("{name} must be in [0, 1], got {v}")))
            }
        };
        unit("alerts.watch_threshold", a.watch_threshold)?;
        unit("alerts.high_threshold", a.high_threshold)?;
        unit("alerts.critical_threshold", a.critical_threshold)?;
        unit("alerts.watch_clear", a.watch_clear)?;
        unit("alerts.high_clear", a.high_clear)?;
        unit("alerts.critical_clear", a.critical_clear)?;
        unit("model.fallback_score", self.model.fallback_score)?;

        if !(a.watch_threshold < a.high_threshold && a.high_threshold < a.critical_threshold) {
            return Err(ConfigError::Invalid(
                "alert thresholds must satisfy watch < high < critical".into(),
            ));
        }
        for (tier, trigger, clear) in [
            ("watch", a.watch_threshold, a.watch_clear),
            ("high", a.high_threshold, a.high_clear),
            ("critical", a.critical_threshold, a.critical_clear),
        ] {
            if clear >= trigger {
                return Err(ConfigError::Invalid(format!(
                    "{tier} clear threshold {clear} must be below its trigger {trigger}"
                )));
            }
        }
        for (name, secs) in [
            ("ingest.skew_tolerance_secs", self.ingest.skew_tolerance_secs),
            ("features.retention_secs", self.features.retention_secs),
            ("features.velocity_window_secs", self.features.velocity_window_secs),
            ("alerts.suppression_secs", a.suppression_secs),
        ] {
            if secs > MAX_WINDOW_SECS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be at most {MAX_WINDOW_SECS}, got {secs}"
                )));
            }
        }
        for (name, ms) in [
            ("model.timeout_ms", self.model.timeout_ms),
            ("pipeline.deadline_ms", self.pipeline.deadline_ms),
        ] {
            if ms == 0 || ms > MAX_BUDGET_MS {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be in 1..={MAX_BUDGET_MS}, got {ms}"
                )));
            }
        }
        if self.features.max_window == 0 {
            return Err(ConfigError::Invalid("features.max_window must be > 0".into()));
        }
        if self.features.velocity_window_secs > self.features.retention_secs {
            return Err(ConfigError::Invalid(
                "features.velocity_window_secs cannot exceed retention_secs".into(),
            ));
        }
        if self.pipeline.workers == 0 || self.pipeline.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.workers and pipeline.queue_capacity must be > 0".into(),
            ));
        }
        if self.pipeline.feed_capacity == 0 {
            return Err(ConfigError::Invalid("pipeline.feed_capacity must be > 0".into()));
        }
        Ok(())
    }
}
