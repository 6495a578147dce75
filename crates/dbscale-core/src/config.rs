//! dbscale.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::tier::{TierError, TierLadder};

/// Environment variable consulted when `api.token` is absent from the file.
pub const TOKEN_ENV: &str = "DBSCALE_API_TOKEN";
/// Environment variable consulted when `api.project_id` is empty.
pub const PROJECT_ENV: &str = "DBSCALE_PROJECT_ID";

/// Errors raised while loading or validating configuration.
///
/// These are fatal at startup and never produced by the running loop.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no metric thresholds configured")]
    NoMetrics,

    #[error("threshold for `{metric}` is not finite")]
    NonFiniteThreshold { metric: String },

    #[error("threshold for `{metric}` is inverted: low {low} must be below high {high}")]
    InvertedThreshold { metric: String, low: f64, high: f64 },

    #[error(transparent)]
    Tier(#[from] TierError),

    #[error("`{0}` must be at least 1")]
    Zero(&'static str),

    #[error("io_timeout ({io_timeout}s) must be shorter than check_interval ({check_interval}s)")]
    TimeoutTooLong { io_timeout: u64, check_interval: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScalerConfig {
    /// Clusters to monitor. Empty means "discover from the management API".
    #[serde(default)]
    pub clusters: Vec<String>,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub scaling: ScalingConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub state: StateConfig,
}

/// Management API connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub project_id: String,
    /// Bearer token. Falls back to `DBSCALE_API_TOKEN`.
    pub token: Option<String>,
    pub request_timeout: u64,
    /// Window (seconds) over which datapoints are averaged per fetch.
    pub metrics_lookback: u64,
    pub granularity: String,
    /// Metric name → measurement name on the management API.
    pub measurements: BTreeMap<String, String>,
}

/// Per-metric hysteresis bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPolicy {
    pub high: f64,
    pub low: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    /// Seconds between ticks.
    pub check_interval: u64,
    /// Seconds allowed for one metrics fetch or resize call.
    pub io_timeout: u64,
    /// Upper bound on clusters evaluated concurrently within a tick.
    pub max_concurrency: usize,
    /// Number of snapshots averaged before classification (1 = raw values).
    pub smoothing_window: usize,
    pub history_capacity: usize,
    pub thresholds: BTreeMap<String, ThresholdPolicy>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Default for clusters without a persisted record.
    pub enabled: bool,
    /// Seconds; 0 disables the time-based delay.
    pub scale_up_cooldown: u64,
    pub scale_down_cooldown: u64,
    pub max_scale_up_per_hour: u32,
    pub max_scale_down_per_hour: u32,
    pub min_instance_size: String,
    pub max_instance_size: String,
    /// Tiers advanced per scale-up.
    pub scale_up_step: u32,
    /// Tiers retreated per scale-down.
    pub scale_down_step: u32,
    /// Ordered tier ladder, smallest first.
    pub tiers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub enabled: bool,
    pub webhook_url: Option<String>,
    pub slack_webhook: Option<String>,
    /// Seconds allowed per delivery attempt.
    pub timeout: u64,
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Persist cluster records and scaling events between runs.
    pub persist: bool,
    pub path: PathBuf,
}

impl Default for ApiConfig {
    fn default() -> Self {
        let measurements = [
            ("cpu", "CPU_USAGE"),
            ("connections", "CONNECTIONS"),
            ("iops", "DISK_IOPS"),
            ("memory", "MEMORY_USAGE"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            base_url: "https://cloud.mongodb.com/api/atlas/v1.0".to_string(),
            project_id: String::new(),
            token: None,
            request_timeout: 30,
            metrics_lookback: 300,
            granularity: "PT1M".to_string(),
            measurements,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let thresholds = [
            ("cpu", 80.0, 30.0),
            ("connections", 1000.0, 100.0),
            ("iops", 1000.0, 100.0),
            ("memory", 85.0, 40.0),
        ]
        .into_iter()
        .map(|(name, high, low)| (name.to_string(), ThresholdPolicy { high, low }))
        .collect();

        Self {
            check_interval: 60,
            io_timeout: 20,
            max_concurrency: 8,
            smoothing_window: 1,
            history_capacity: 100,
            thresholds,
        }
    }
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scale_up_cooldown: 0,
            scale_down_cooldown: 300,
            max_scale_up_per_hour: 3,
            max_scale_down_per_hour: 2,
            min_instance_size: "M10".to_string(),
            max_instance_size: "M80".to_string(),
            scale_up_step: 1,
            scale_down_step: 1,
            tiers: TierLadder::ATLAS_TIERS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            webhook_url: None,
            slack_webhook: None,
            timeout: 10,
            queue_capacity: 256,
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            persist: true,
            path: PathBuf::from("dbscale.redb"),
        }
    }
}

impl MonitoringConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout)
    }

    /// Metric names in a stable order.
    pub fn metric_names(&self) -> Vec<String> {
        self.thresholds.keys().cloned().collect()
    }
}

impl ScalingConfig {
    pub fn ladder(&self) -> Result<TierLadder, TierError> {
        TierLadder::new(
            self.tiers.clone(),
            &self.min_instance_size,
            &self.max_instance_size,
        )
    }
}

impl ScalerConfig {
    /// Load, apply environment fallbacks, and validate.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse without validation or environment fallbacks.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Fill secrets missing from the file from the environment.
    pub fn apply_env(&mut self) {
        if self.api.token.as_deref().is_none_or(str::is_empty)
            && let Ok(token) = std::env::var(TOKEN_ENV)
        {
            self.api.token = Some(token);
        }
        if self.api.project_id.is_empty()
            && let Ok(project) = std::env::var(PROJECT_ENV)
        {
            self.api.project_id = project;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let monitoring = &self.monitoring;
        if monitoring.thresholds.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        for (metric, t) in &monitoring.thresholds {
            if !t.high.is_finite() || !t.low.is_finite() {
                return Err(ConfigError::NonFiniteThreshold {
                    metric: metric.clone(),
                });
            }
            if t.low >= t.high {
                return Err(ConfigError::InvertedThreshold {
                    metric: metric.clone(),
                    low: t.low,
                    high: t.high,
                });
            }
        }

        if monitoring.check_interval == 0 {
            return Err(ConfigError::Zero("monitoring.check_interval"));
        }
        if monitoring.io_timeout == 0 {
            return Err(ConfigError::Zero("monitoring.io_timeout"));
        }
        if monitoring.io_timeout >= monitoring.check_interval {
            return Err(ConfigError::TimeoutTooLong {
                io_timeout: monitoring.io_timeout,
                check_interval: monitoring.check_interval,
            });
        }
        if monitoring.max_concurrency == 0 {
            return Err(ConfigError::Zero("monitoring.max_concurrency"));
        }
        if monitoring.smoothing_window == 0 {
            return Err(ConfigError::Zero("monitoring.smoothing_window"));
        }
        if monitoring.history_capacity == 0 {
            return Err(ConfigError::Zero("monitoring.history_capacity"));
        }

        let scaling = &self.scaling;
        if scaling.scale_up_step == 0 {
            return Err(ConfigError::Zero("scaling.scale_up_step"));
        }
        if scaling.scale_down_step == 0 {
            return Err(ConfigError::Zero("scaling.scale_down_step"));
        }
        scaling.ladder()?;

        if self.alerts.queue_capacity == 0 {
            return Err(ConfigError::Zero("alerts.queue_capacity"));
        }
        Ok(())
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a sample dbscale.toml with placeholder credentials.
    pub fn scaffold() -> Self {
        ScalerConfig {
            api: ApiConfig {
                project_id: "YOUR_PROJECT_ID".to_string(),
                token: Some("YOUR_API_TOKEN".to_string()),
                ..ApiConfig::default()
            },
            clusters: vec!["my-cluster".to_string()],
            ..ScalerConfig::default()
        }
    }
}
