//! Domain records shared across dbscale crates.
//!
//! Everything here is serializable so it can be persisted, shipped to alert
//! channels, or returned from the REST API unchanged. Timestamps are wall
//! clock seconds since the Unix epoch; the control loop keeps its own
//! monotonic timestamps and converts at the edges.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Identifier of a managed database cluster.
pub type ClusterId = String;

// ── Metrics ───────────────────────────────────────────────────────

/// Point-in-time metric values for one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricSnapshot {
    pub cluster_id: ClusterId,
    pub timestamp: u64,
    /// Metric name → value. Metrics that could not be obtained are absent.
    pub values: BTreeMap<String, f64>,
}

/// Classification of one metric dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionState {
    High,
    #[default]
    Normal,
    Low,
}

// ── Scaling ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Up,
    Down,
}

impl std::fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScaleDirection::Up => write!(f, "scale_up"),
            ScaleDirection::Down => write!(f, "scale_down"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleOutcome {
    Success,
    Failure,
}

/// Coarse classification of a failed resize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Connectivity or authentication problem.
    Transport,
    /// The remote refused the request.
    Rejected,
    /// Another operation is already in flight on the cluster.
    Conflict,
    /// No answer within the I/O timeout.
    Timeout,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScalingError {
    pub class: ErrorClass,
    pub detail: String,
}

/// Record of one resize attempt. Append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScalingEvent {
    pub cluster_id: ClusterId,
    pub timestamp: u64,
    /// `None` for a forced override landing on the current size.
    pub direction: Option<ScaleDirection>,
    pub from_size: String,
    pub to_size: String,
    /// Human-readable reasons, e.g. `cpu=85.0 >= 80.0`.
    pub triggering_metrics: Vec<String>,
    /// Issued by an operator rather than the decision engine.
    pub forced: bool,
    pub outcome: ScaleOutcome,
    pub error: Option<ScalingError>,
}

impl ScalingEvent {
    pub fn is_success(&self) -> bool {
        self.outcome == ScaleOutcome::Success
    }
}

/// Raised when no configured metric could be obtained for a tick.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DegradedDataEvent {
    pub cluster_id: ClusterId,
    pub timestamp: u64,
    pub missing: Vec<String>,
}

// ── Alerts ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

/// Notification handed to the alert dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Alert {
    Scaling(ScalingEvent),
    DegradedData(DegradedDataEvent),
    /// One or more dimensions entered the high band.
    ThresholdBreach {
        cluster_id: ClusterId,
        timestamp: u64,
        breaches: Vec<String>,
    },
    /// The metrics fetch failed outright.
    MetricsUnavailable {
        cluster_id: ClusterId,
        timestamp: u64,
        error: String,
    },
}

impl Alert {
    pub fn cluster_id(&self) -> &str {
        match self {
            Alert::Scaling(e) => &e.cluster_id,
            Alert::DegradedData(e) => &e.cluster_id,
            Alert::ThresholdBreach { cluster_id, .. } => cluster_id,
            Alert::MetricsUnavailable { cluster_id, .. } => cluster_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            Alert::Scaling(e) => e.timestamp,
            Alert::DegradedData(e) => e.timestamp,
            Alert::ThresholdBreach { timestamp, .. } => *timestamp,
            Alert::MetricsUnavailable { timestamp, .. } => *timestamp,
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            Alert::Scaling(e) if e.is_success() => Severity::Info,
            Alert::Scaling(_) => Severity::Critical,
            Alert::DegradedData(_) | Alert::MetricsUnavailable { .. } => Severity::Critical,
            Alert::ThresholdBreach { .. } => Severity::Warning,
        }
    }

    /// One-line description used by log and chat channels.
    pub fn summary(&self) -> String {
        match self {
            Alert::Scaling(e) => {
                let action = e
                    .direction
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "resize".to_string());
                let forced = if e.forced { " (forced)" } else { "" };
                match &e.error {
                    None => format!(
                        "{action}{forced}: {} from {} to {}",
                        e.cluster_id, e.from_size, e.to_size
                    ),
                    Some(err) => format!(
                        "{action}{forced} failed: {} from {} to {}: {:?}: {}",
                        e.cluster_id, e.from_size, e.to_size, err.class, err.detail
                    ),
                }
            }
            Alert::DegradedData(e) => format!(
                "no metrics available for {} (missing: {})",
                e.cluster_id,
                e.missing.join(", ")
            ),
            Alert::ThresholdBreach {
                cluster_id,
                breaches,
                ..
            } => format!("{cluster_id}: {}", breaches.join("; ")),
            Alert::MetricsUnavailable {
                cluster_id, error, ..
            } => format!("metrics fetch failed for {cluster_id}: {error}"),
        }
    }
}

// ── Durable cluster state ─────────────────────────────────────────

/// Persisted form of a cluster's control state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterRecord {
    pub cluster_id: ClusterId,
    /// Tier label (labels survive ladder edits, indices do not).
    pub current_size: String,
    pub enabled: bool,
    pub last_scale_up_at: Option<u64>,
    pub last_scale_down_at: Option<u64>,
    pub scale_up_timestamps: Vec<u64>,
    pub scale_down_timestamps: Vec<u64>,
    /// Last known classification per metric, so hysteresis survives restarts.
    #[serde(default)]
    pub dimensions: BTreeMap<String, DimensionState>,
    pub updated_at: u64,
}

/// Read-only status view of one cluster.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClusterStatus {
    pub cluster_id: ClusterId,
    pub current_size: String,
    pub enabled: bool,
    pub last_scale_up_at: Option<u64>,
    pub last_scale_down_at: Option<u64>,
    pub scale_ups_last_hour: usize,
    pub scale_downs_last_hour: usize,
    pub dimensions: BTreeMap<String, DimensionState>,
    /// Most recent first.
    pub recent_events: Vec<ScalingEvent>,
    /// Most recent first.
    pub recent_snapshots: Vec<MetricSnapshot>,
}
