//! Collaborator contracts consumed by the control loop.
//!
//! The engine never talks to the network or to disk directly; it is handed
//! implementations of these traits. Production wiring lives in
//! `dbscale-atlas`, `dbscale-alert`, and `dbscale-state`; tests use fakes.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Alert, ClusterRecord, ErrorClass, ScalingEvent};

// ── Metrics source ────────────────────────────────────────────────

/// Values returned by one metrics fetch.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetricReading {
    /// Epoch seconds the values are valid for.
    pub timestamp: u64,
    /// Metric name → value. Metrics without data are simply absent.
    pub values: BTreeMap<String, f64>,
}

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unknown cluster: {0}")]
    UnknownCluster(String),

    #[error("metrics fetch timed out after {0:?}")]
    Timeout(Duration),
}

#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch(
        &self,
        cluster_id: &str,
        metric_names: &[String],
    ) -> Result<MetricReading, CollectError>;
}

// ── Cluster control ───────────────────────────────────────────────

/// Successful acknowledgement of a resize request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizeAck {
    /// The remote accepted the change.
    Accepted,
    /// The cluster already runs at the requested size.
    AlreadyAtTarget,
}

#[derive(Debug, Error)]
pub enum ResizeError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rejected by remote: {0}")]
    Rejected(String),

    #[error("conflicting operation in progress: {0}")]
    Conflict(String),

    #[error("resize timed out after {0:?}")]
    Timeout(Duration),
}

impl ResizeError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ResizeError::Transport(_) => ErrorClass::Transport,
            ResizeError::Rejected(_) => ErrorClass::Rejected,
            ResizeError::Conflict(_) => ErrorClass::Conflict,
            ResizeError::Timeout(_) => ErrorClass::Timeout,
        }
    }
}

/// Resize operations against the managed service.
///
/// `resize` takes a target size rather than a delta and must be safe to
/// reissue with the same target.
#[async_trait]
pub trait ClusterControl: Send + Sync {
    /// Current tier label of the cluster, used when no record exists yet.
    async fn current_size(&self, cluster_id: &str) -> Result<String, ResizeError>;

    async fn resize(&self, cluster_id: &str, target_size: &str) -> Result<ResizeAck, ResizeError>;
}

// ── Alerts ────────────────────────────────────────────────────────

/// Fire-and-forget notification sink. Must never block the caller.
pub trait AlertSink: Send + Sync {
    fn notify(&self, alert: Alert);
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAlertSink;

impl AlertSink for NullAlertSink {
    fn notify(&self, _alert: Alert) {}
}

// ── Persistence ───────────────────────────────────────────────────

#[derive(Debug, Error)]
#[error("state persistence failed: {0}")]
pub struct PersistError(pub String);

/// Durable storage for cluster records and the scaling-event log.
pub trait StatePersistence: Send + Sync {
    fn load(&self, cluster_id: &str) -> Result<Option<ClusterRecord>, PersistError>;

    fn save(&self, record: &ClusterRecord) -> Result<(), PersistError>;

    /// Append an event, keeping at most `keep` events for its cluster.
    fn append_event(&self, event: &ScalingEvent, keep: usize) -> Result<(), PersistError>;

    /// Most recent first.
    fn recent_events(&self, cluster_id: &str, limit: usize)
    -> Result<Vec<ScalingEvent>, PersistError>;
}
