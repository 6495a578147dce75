//! Controller — the periodic driver for every monitored cluster.
//!
//! Owns one `ClusterPipeline` per cluster. A tick runs all pipelines
//! concurrently (bounded by `max_concurrency`); each pipeline holds the
//! only mutable borrow of its cluster's state while it runs. Operator
//! commands arrive through a `ControllerHandle` and are applied between
//! ticks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use dbscale_core::config::ScalerConfig;
use dbscale_core::ports::{
    AlertSink, ClusterControl, MetricsSource, ResizeError, StatePersistence,
};
use dbscale_core::{
    Alert, ClusterId, ClusterStatus, DegradedDataEvent, DimensionState, ScalingEvent,
    ThresholdPolicy, TierError,
};
use dbscale_metrics::MetricsCollector;

use crate::clock::Clock;
use crate::cluster::ClusterState;
use crate::decision::{DecisionEngine, ReasonCode};
use crate::executor::Executor;
use crate::guard::{Guard, GuardPolicy};
use crate::health::{self, OverallSignal};
use crate::history::History;

/// Errors returned to operators.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("cluster `{0}` is not monitored")]
    UnknownCluster(String),

    #[error("invalid target size: {0}")]
    InvalidTarget(#[from] TierError),

    #[error("controller is not running")]
    Stopped,
}

/// External collaborators the controller is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub metrics: Arc<dyn MetricsSource>,
    pub control: Arc<dyn ClusterControl>,
    pub alerts: Arc<dyn AlertSink>,
    pub store: Option<Arc<dyn StatePersistence>>,
    pub clock: Arc<dyn Clock>,
}

/// Result of evaluating one cluster once.
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub cluster_id: ClusterId,
    /// Size after this check.
    pub current_size: String,
    pub enabled: bool,
    pub signal: Option<OverallSignal>,
    pub dimensions: BTreeMap<String, DimensionState>,
    pub values: BTreeMap<String, f64>,
    pub reason: Option<ReasonCode>,
    pub event: Option<ScalingEvent>,
    /// Set when metrics could not be fetched.
    pub error: Option<String>,
}

enum Command {
    Status {
        cluster_id: Option<ClusterId>,
        limit: usize,
        reply: oneshot::Sender<Result<Vec<ClusterStatus>, ControlError>>,
    },
    SetEnabled {
        cluster_id: ClusterId,
        enabled: bool,
        reply: oneshot::Sender<Result<ClusterStatus, ControlError>>,
    },
    ForceScale {
        cluster_id: ClusterId,
        target_size: String,
        reply: oneshot::Sender<Result<ScalingEvent, ControlError>>,
    },
    RunOnce {
        cluster_id: Option<ClusterId>,
        reply: oneshot::Sender<Result<Vec<CheckReport>, ControlError>>,
    },
}

/// Cloneable front door to a running controller.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::Sender<Command>,
}

impl ControllerHandle {
    pub async fn status(
        &self,
        cluster_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<ClusterStatus>, ControlError> {
        self.request(|reply| Command::Status {
            cluster_id: cluster_id.map(str::to_string),
            limit,
            reply,
        })
        .await
    }

    pub async fn set_enabled(
        &self,
        cluster_id: &str,
        enabled: bool,
    ) -> Result<ClusterStatus, ControlError> {
        self.request(|reply| Command::SetEnabled {
            cluster_id: cluster_id.to_string(),
            enabled,
            reply,
        })
        .await
    }

    pub async fn force_scale(
        &self,
        cluster_id: &str,
        target_size: &str,
    ) -> Result<ScalingEvent, ControlError> {
        self.request(|reply| Command::ForceScale {
            cluster_id: cluster_id.to_string(),
            target_size: target_size.to_string(),
            reply,
        })
        .await
    }

    pub async fn run_once(&self, cluster_id: Option<&str>) -> Result<Vec<CheckReport>, ControlError> {
        self.request(|reply| Command::RunOnce {
            cluster_id: cluster_id.map(str::to_string),
            reply,
        })
        .await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, ControlError>>) -> Command,
    ) -> Result<T, ControlError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| ControlError::Stopped)?;
        rx.await.map_err(|_| ControlError::Stopped)?
    }
}

/// Everything one cluster's pipeline owns.
struct ClusterPipeline {
    state: ClusterState,
    history: History,
}

/// Shared, read-only parts of a tick.
struct TickContext<'a> {
    collector: &'a MetricsCollector,
    engine: &'a DecisionEngine,
    executor: &'a Executor,
    thresholds: &'a BTreeMap<String, ThresholdPolicy>,
    smoothing_window: usize,
    history_capacity: usize,
    alerts: &'a dyn AlertSink,
    store: Option<&'a dyn StatePersistence>,
    clock: &'a dyn Clock,
}

pub struct Controller {
    pipelines: BTreeMap<ClusterId, ClusterPipeline>,
    collector: MetricsCollector,
    engine: DecisionEngine,
    executor: Executor,
    thresholds: BTreeMap<String, ThresholdPolicy>,
    control: Arc<dyn ClusterControl>,
    alerts: Arc<dyn AlertSink>,
    store: Option<Arc<dyn StatePersistence>>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    io_timeout: Duration,
    max_concurrency: usize,
    smoothing_window: usize,
    history_capacity: usize,
    default_enabled: bool,
    commands: mpsc::Receiver<Command>,
    handle: ControllerHandle,
}

impl Controller {
    /// Build a controller with no clusters. `config` is assumed validated.
    pub fn new(config: &ScalerConfig, deps: Collaborators) -> anyhow::Result<Self> {
        let ladder = config.scaling.ladder()?;
        let monitoring = &config.monitoring;
        let guard = Guard::new(GuardPolicy::from_config(&config.scaling));
        let engine = DecisionEngine::new(
            guard,
            ladder.clone(),
            config.scaling.scale_up_step,
            config.scaling.scale_down_step,
        );
        let executor = Executor::new(
            deps.control.clone(),
            deps.alerts.clone(),
            ladder,
            monitoring.io_timeout(),
        );
        let collector = MetricsCollector::new(
            deps.metrics.clone(),
            monitoring.metric_names(),
            monitoring.io_timeout(),
        );
        let (tx, commands) = mpsc::channel(32);

        Ok(Self {
            pipelines: BTreeMap::new(),
            collector,
            engine,
            executor,
            thresholds: monitoring.thresholds.clone(),
            control: deps.control,
            alerts: deps.alerts,
            store: deps.store,
            clock: deps.clock,
            interval: monitoring.check_interval(),
            io_timeout: monitoring.io_timeout(),
            max_concurrency: monitoring.max_concurrency.max(1),
            smoothing_window: monitoring.smoothing_window,
            history_capacity: monitoring.history_capacity,
            default_enabled: config.scaling.enabled,
            commands,
            handle: ControllerHandle { tx },
        })
    }

    pub fn handle(&self) -> ControllerHandle {
        self.handle.clone()
    }

    pub fn cluster_ids(&self) -> Vec<ClusterId> {
        self.pipelines.keys().cloned().collect()
    }

    /// Start monitoring a cluster.
    ///
    /// Restores the persisted record and event log when present; otherwise
    /// asks the remote for the current size and starts cold. A size outside
    /// the configured bounds is an error.
    pub async fn add_cluster(&mut self, cluster_id: &str) -> anyhow::Result<()> {
        let ladder = self.engine.ladder();
        let mut history = History::new(self.history_capacity);

        let persisted = match &self.store {
            Some(store) => store.load(cluster_id)?,
            None => None,
        };

        let state = match persisted {
            Some(record) => {
                let state = ClusterState::from_record(&record, ladder, self.clock.as_ref())
                    .map_err(|e| anyhow::anyhow!("cluster {cluster_id}: persisted size: {e}"))?;
                info!(%cluster_id, size = %record.current_size, enabled = record.enabled, "restored cluster state");
                state
            }
            None => {
                let size = tokio::time::timeout(self.io_timeout, self.control.current_size(cluster_id))
                    .await
                    .unwrap_or(Err(ResizeError::Timeout(self.io_timeout)))
                    .map_err(|e| anyhow::anyhow!("cluster {cluster_id}: reading current size: {e}"))?;
                let index = ladder
                    .bounded_index(&size)
                    .map_err(|e| anyhow::anyhow!("cluster {cluster_id}: {e}"))?;
                info!(%cluster_id, %size, "monitoring new cluster");
                ClusterState::new(cluster_id, index, self.default_enabled)
            }
        };

        if let Some(store) = &self.store {
            let mut events = store.recent_events(cluster_id, self.history_capacity)?;
            events.reverse();
            for event in events {
                history.record_event(event);
            }
        }

        self.pipelines
            .insert(cluster_id.to_string(), ClusterPipeline { state, history });
        Ok(())
    }

    /// Evaluate every cluster once.
    pub async fn tick(&mut self) -> Vec<CheckReport> {
        let Self {
            pipelines,
            collector,
            engine,
            executor,
            thresholds,
            alerts,
            store,
            clock,
            smoothing_window,
            history_capacity,
            max_concurrency,
            ..
        } = self;
        let ctx = TickContext {
            collector,
            engine,
            executor,
            thresholds,
            smoothing_window: *smoothing_window,
            history_capacity: *history_capacity,
            alerts: alerts.as_ref(),
            store: store.as_deref(),
            clock: clock.as_ref(),
        };

        // Boxed up front so the stream holds concrete `Send` futures and
        // `run` stays spawnable.
        let pending: Vec<BoxFuture<'_, CheckReport>> = pipelines
            .values_mut()
            .map(|pipeline| ctx.run(pipeline).boxed())
            .collect();
        let mut reports: Vec<CheckReport> = futures::stream::iter(pending)
            .buffer_unordered(*max_concurrency)
            .collect()
            .await;
        reports.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));
        reports
    }

    /// Evaluate one cluster, or all of them.
    pub async fn run_once(&mut self, cluster_id: Option<&str>) -> Result<Vec<CheckReport>, ControlError> {
        let Some(cluster_id) = cluster_id else {
            return Ok(self.tick().await);
        };

        let ctx = TickContext {
            collector: &self.collector,
            engine: &self.engine,
            executor: &self.executor,
            thresholds: &self.thresholds,
            smoothing_window: self.smoothing_window,
            history_capacity: self.history_capacity,
            alerts: self.alerts.as_ref(),
            store: self.store.as_deref(),
            clock: self.clock.as_ref(),
        };
        let pipeline = self
            .pipelines
            .get_mut(cluster_id)
            .ok_or_else(|| ControlError::UnknownCluster(cluster_id.to_string()))?;
        Ok(vec![ctx.run(pipeline).await])
    }

    /// Status of one cluster, or all of them, with up to `limit` recent
    /// events and snapshots each.
    pub fn status(&self, cluster_id: Option<&str>, limit: usize) -> Result<Vec<ClusterStatus>, ControlError> {
        match cluster_id {
            Some(id) => {
                let pipeline = self
                    .pipelines
                    .get(id)
                    .ok_or_else(|| ControlError::UnknownCluster(id.to_string()))?;
                Ok(vec![self.status_of(pipeline, limit)])
            }
            None => Ok(self
                .pipelines
                .values()
                .map(|p| self.status_of(p, limit))
                .collect()),
        }
    }

    /// Enable or disable automatic scaling. Takes effect from the next
    /// decision on; does not touch evaluation or history.
    pub fn set_enabled(&mut self, cluster_id: &str, enabled: bool) -> Result<ClusterStatus, ControlError> {
        let pipeline = self
            .pipelines
            .get_mut(cluster_id)
            .ok_or_else(|| ControlError::UnknownCluster(cluster_id.to_string()))?;
        pipeline.state.enabled = enabled;
        info!(%cluster_id, enabled, "autoscaling toggled");

        let pipeline = &self.pipelines[cluster_id];
        if let Some(store) = &self.store {
            persist(store.as_ref(), &pipeline.state, self.engine.ladder(), self.clock.as_ref());
        }
        Ok(self.status_of(pipeline, 0))
    }

    /// Resize to an explicit tier, bypassing evaluation and the guard.
    pub async fn force_scale(
        &mut self,
        cluster_id: &str,
        target_size: &str,
    ) -> Result<ScalingEvent, ControlError> {
        let pipeline = self
            .pipelines
            .get_mut(cluster_id)
            .ok_or_else(|| ControlError::UnknownCluster(cluster_id.to_string()))?;
        let decision = self.engine.force(&pipeline.state, target_size)?;
        info!(%cluster_id, %target_size, "forced resize requested");

        let now = self.clock.now();
        let epoch = self.clock.epoch_secs();
        let event = self
            .executor
            .execute(&decision, &mut pipeline.state, &mut pipeline.history, now, epoch)
            .await
            .ok_or(ControlError::Stopped)?;

        if let Some(store) = &self.store {
            record_event(store.as_ref(), &event, self.history_capacity);
            if event.is_success() {
                persist(store.as_ref(), &pipeline.state, self.engine.ladder(), self.clock.as_ref());
            }
        }
        Ok(event)
    }

    /// Tick every `check_interval` until `shutdown` flips, applying
    /// operator commands between ticks.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            clusters = self.pipelines.len(),
            "controller started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let reports = self.tick().await;
                    let failed = reports.iter().filter(|r| r.error.is_some()).count();
                    let scaled = reports.iter().filter(|r| r.event.is_some()).count();
                    debug!(clusters = reports.len(), scaled, failed, "tick complete");
                }
                Some(command) = self.commands.recv() => {
                    self.apply(command).await;
                }
                _ = shutdown.changed() => {
                    info!("controller shutting down");
                    break;
                }
            }
        }
    }

    async fn apply(&mut self, command: Command) {
        // A dropped receiver means the caller gave up; nothing to do.
        match command {
            Command::Status {
                cluster_id,
                limit,
                reply,
            } => {
                let _ = reply.send(self.status(cluster_id.as_deref(), limit));
            }
            Command::SetEnabled {
                cluster_id,
                enabled,
                reply,
            } => {
                let _ = reply.send(self.set_enabled(&cluster_id, enabled));
            }
            Command::ForceScale {
                cluster_id,
                target_size,
                reply,
            } => {
                let _ = reply.send(self.force_scale(&cluster_id, &target_size).await);
            }
            Command::RunOnce { cluster_id, reply } => {
                let _ = reply.send(self.run_once(cluster_id.as_deref()).await);
            }
        }
    }

    fn status_of(&self, pipeline: &ClusterPipeline, limit: usize) -> ClusterStatus {
        let now = self.clock.now();
        let record = pipeline
            .state
            .to_record(self.engine.ladder(), self.clock.as_ref());
        ClusterStatus {
            cluster_id: record.cluster_id,
            current_size: record.current_size,
            enabled: record.enabled,
            last_scale_up_at: record.last_scale_up_at,
            last_scale_down_at: record.last_scale_down_at,
            scale_ups_last_hour: pipeline.state.scale_up_timestamps.count(now),
            scale_downs_last_hour: pipeline.state.scale_down_timestamps.count(now),
            dimensions: record.dimensions,
            recent_events: pipeline.history.recent_events().take(limit).cloned().collect(),
            recent_snapshots: pipeline
                .history
                .recent_snapshots()
                .take(limit)
                .cloned()
                .collect(),
        }
    }
}

impl TickContext<'_> {
    /// One pass of the pipeline for one cluster. Never panics or aborts
    /// the tick; failures end up in the report.
    async fn run(&self, pipeline: &mut ClusterPipeline) -> CheckReport {
        let ClusterPipeline { state, history } = pipeline;
        let cluster_id = state.cluster_id.clone();
        let now = self.clock.now();
        let epoch = self.clock.epoch_secs();

        let mut report = CheckReport {
            cluster_id: cluster_id.clone(),
            current_size: String::new(),
            enabled: state.enabled,
            signal: None,
            dimensions: state.dimensions.clone(),
            values: BTreeMap::new(),
            reason: None,
            event: None,
            error: None,
        };

        match self.collector.collect(&cluster_id, epoch).await {
            Err(e) => {
                warn!(%cluster_id, error = %e, "metrics unavailable");
                self.alerts.notify(Alert::MetricsUnavailable {
                    cluster_id: cluster_id.clone(),
                    timestamp: epoch,
                    error: e.to_string(),
                });
                report.error = Some(e.to_string());
            }
            Ok(snapshot) => {
                let values =
                    health::smoothed_values(&snapshot, history.recent_snapshots(), self.smoothing_window);
                history.record_snapshot(snapshot);

                let evaluation = health::evaluate(&values, &state.dimensions, self.thresholds);
                if evaluation.degraded {
                    warn!(%cluster_id, missing = ?evaluation.missing, "no metric data, skipping decision");
                    self.alerts.notify(Alert::DegradedData(DegradedDataEvent {
                        cluster_id: cluster_id.clone(),
                        timestamp: epoch,
                        missing: evaluation.missing.clone(),
                    }));
                }
                if !evaluation.entered_high.is_empty() {
                    self.alerts.notify(Alert::ThresholdBreach {
                        cluster_id: cluster_id.clone(),
                        timestamp: epoch,
                        breaches: evaluation.entered_high.clone(),
                    });
                }

                let dimensions_changed = state.dimensions != evaluation.dimensions;
                state.dimensions = evaluation.dimensions.clone();

                let decision = self.engine.decide(&evaluation, state, now);
                debug!(%cluster_id, signal = ?evaluation.signal, reason = %decision.reason, "decision");

                let event = self
                    .executor
                    .execute(&decision, state, history, now, epoch)
                    .await;

                if let Some(store) = self.store {
                    if let Some(event) = &event {
                        record_event(store, event, self.history_capacity);
                    }
                    let scaled = event.as_ref().is_some_and(ScalingEvent::is_success);
                    if scaled || dimensions_changed {
                        persist(store, state, self.engine.ladder(), self.clock);
                    }
                }

                report.signal = Some(evaluation.signal);
                report.dimensions = evaluation.dimensions;
                report.values = values;
                report.reason = Some(decision.reason);
                report.event = event;
            }
        }

        report.current_size = self
            .engine
            .ladder()
            .label(state.current_size)
            .unwrap_or_default()
            .to_string();
        report
    }
}

fn persist(
    store: &dyn StatePersistence,
    state: &ClusterState,
    ladder: &dbscale_core::TierLadder,
    clock: &dyn Clock,
) {
    if let Err(e) = store.save(&state.to_record(ladder, clock)) {
        error!(cluster_id = %state.cluster_id, error = %e, "failed to persist cluster state");
    }
}

fn record_event(store: &dyn StatePersistence, event: &ScalingEvent, keep: usize) {
    if let Err(e) = store.append_event(event, keep) {
        error!(cluster_id = %event.cluster_id, error = %e, "failed to persist scaling event");
    }
}
