//! Action executor — applies a decision through `ClusterControl`.
//!
//! State is only mutated after the remote confirms the resize. A failed
//! attempt leaves size, cooldowns, and hourly windows untouched, so the
//! same opportunity is retried on the next tick without penalty.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use dbscale_core::ports::{AlertSink, ClusterControl, ResizeAck, ResizeError};
use dbscale_core::{
    Alert, ScaleDirection, ScaleOutcome, ScalingError, ScalingEvent, TierLadder,
};

use crate::cluster::ClusterState;
use crate::decision::{Action, ScalingDecision};
use crate::history::History;

#[derive(Clone)]
pub struct Executor {
    control: Arc<dyn ClusterControl>,
    alerts: Arc<dyn AlertSink>,
    ladder: TierLadder,
    timeout: Duration,
}

impl Executor {
    pub fn new(
        control: Arc<dyn ClusterControl>,
        alerts: Arc<dyn AlertSink>,
        ladder: TierLadder,
        timeout: Duration,
    ) -> Self {
        Self {
            control,
            alerts,
            ladder,
            timeout,
        }
    }

    /// Carry out `decision` for `state`.
    ///
    /// Returns `None` when there is nothing to do. Otherwise the resulting
    /// event has already been appended to `history` and sent to the alert
    /// sink.
    pub async fn execute(
        &self,
        decision: &ScalingDecision,
        state: &mut ClusterState,
        history: &mut History,
        now: Instant,
        epoch: u64,
    ) -> Option<ScalingEvent> {
        let from_label = self.label(state.current_size);

        let (direction, target) = match decision.action {
            Action::ScaleUp { target } => (ScaleDirection::Up, target),
            Action::ScaleDown { target } => (ScaleDirection::Down, target),
            Action::None => return None,
        };
        let to_label = self.label(target);

        let result = match tokio::time::timeout(
            self.timeout,
            self.control.resize(&state.cluster_id, &to_label),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ResizeError::Timeout(self.timeout)),
        };

        let event = match result {
            Ok(ack) => {
                state.record_scale(direction, target, now);
                info!(
                    cluster_id = %state.cluster_id,
                    %direction,
                    from = %from_label,
                    to = %to_label,
                    forced = decision.forced,
                    already_at_target = ack == ResizeAck::AlreadyAtTarget,
                    "cluster resized"
                );
                self.event(decision, Some(direction), &from_label, &to_label, epoch, None)
            }
            Err(e) => {
                warn!(
                    cluster_id = %state.cluster_id,
                    %direction,
                    from = %from_label,
                    to = %to_label,
                    error = %e,
                    "resize failed"
                );
                let error = ScalingError {
                    class: e.class(),
                    detail: e.to_string(),
                };
                self.event(decision, Some(direction), &from_label, &to_label, epoch, Some(error))
            }
        };

        Some(self.publish(event, history))
    }

    fn label(&self, index: usize) -> String {
        self.ladder.label(index).unwrap_or_default().to_string()
    }

    fn event(
        &self,
        decision: &ScalingDecision,
        direction: Option<ScaleDirection>,
        from: &str,
        to: &str,
        epoch: u64,
        error: Option<ScalingError>,
    ) -> ScalingEvent {
        ScalingEvent {
            cluster_id: decision.cluster_id.clone(),
            timestamp: epoch,
            direction,
            from_size: from.to_string(),
            to_size: to.to_string(),
            triggering_metrics: decision.triggers.clone(),
            forced: decision.forced,
            outcome: if error.is_none() {
                ScaleOutcome::Success
            } else {
                ScaleOutcome::Failure
            },
            error,
        }
    }

    fn publish(&self, event: ScalingEvent, history: &mut History) -> ScalingEvent {
        history.record_event(event.clone());
        self.alerts.notify(Alert::Scaling(event.clone()));
        event
    }
}
