//! Decision engine — turns an evaluation into at most one resize.

use std::fmt;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use dbscale_core::{ClusterId, ScaleDirection, TierError, TierLadder};

use crate::cluster::ClusterState;
use crate::guard::{Denial, Guard};
use crate::health::{Evaluation, OverallSignal};

/// Why a decision came out the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReasonCode {
    /// A threshold was crossed and the guard permitted a resize.
    Threshold,
    /// Operator override.
    Forced,
    Steady,
    DegradedData,
    AtCeiling,
    AtFloor,
    Cooldown,
    RateLimited,
    Disabled,
}

impl ReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::Threshold => "threshold",
            ReasonCode::Forced => "forced",
            ReasonCode::Steady => "steady",
            ReasonCode::DegradedData => "degraded-data",
            ReasonCode::AtCeiling => "at-ceiling",
            ReasonCode::AtFloor => "at-floor",
            ReasonCode::Cooldown => "cooldown",
            ReasonCode::RateLimited => "rate-limited",
            ReasonCode::Disabled => "disabled",
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Denial> for ReasonCode {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Disabled => ReasonCode::Disabled,
            Denial::Cooldown { .. } => ReasonCode::Cooldown,
            Denial::RateLimited { .. } => ReasonCode::RateLimited,
        }
    }
}

/// Requested change. Targets are ladder indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    ScaleUp { target: usize },
    ScaleDown { target: usize },
}

impl Action {
    pub fn direction(&self) -> Option<ScaleDirection> {
        match self {
            Action::None => None,
            Action::ScaleUp { .. } => Some(ScaleDirection::Up),
            Action::ScaleDown { .. } => Some(ScaleDirection::Down),
        }
    }

    pub fn target(&self) -> Option<usize> {
        match self {
            Action::None => None,
            Action::ScaleUp { target } | Action::ScaleDown { target } => Some(*target),
        }
    }
}

/// Outcome of one decision. Lives for a single tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScalingDecision {
    pub cluster_id: ClusterId,
    pub action: Action,
    pub reason: ReasonCode,
    /// Metrics behind a threshold decision.
    pub triggers: Vec<String>,
    pub forced: bool,
}

impl ScalingDecision {
    fn none(cluster_id: &str, reason: ReasonCode) -> Self {
        Self {
            cluster_id: cluster_id.to_string(),
            action: Action::None,
            reason,
            triggers: Vec::new(),
            forced: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    guard: Guard,
    ladder: TierLadder,
    scale_up_step: u32,
    scale_down_step: u32,
}

impl DecisionEngine {
    pub fn new(guard: Guard, ladder: TierLadder, scale_up_step: u32, scale_down_step: u32) -> Self {
        Self {
            guard,
            ladder,
            scale_up_step,
            scale_down_step,
        }
    }

    pub fn ladder(&self) -> &TierLadder {
        &self.ladder
    }

    pub fn guard(&self) -> &Guard {
        &self.guard
    }

    /// Decide what to do with `state` given this tick's evaluation.
    pub fn decide(
        &self,
        evaluation: &Evaluation,
        state: &mut ClusterState,
        now: Instant,
    ) -> ScalingDecision {
        let id = state.cluster_id.clone();

        if !state.enabled {
            return ScalingDecision::none(&id, ReasonCode::Disabled);
        }
        if evaluation.degraded {
            return ScalingDecision::none(&id, ReasonCode::DegradedData);
        }

        let direction = match evaluation.signal {
            OverallSignal::Normal => return ScalingDecision::none(&id, ReasonCode::Steady),
            OverallSignal::High => ScaleDirection::Up,
            OverallSignal::Low => ScaleDirection::Down,
        };

        if let Err(denial) = self.guard.check(state, direction, now) {
            debug!(cluster_id = %id, %direction, ?denial, "scale denied by guard");
            let mut decision = ScalingDecision::none(&id, denial.into());
            decision.triggers = evaluation.triggers.clone();
            return decision;
        }

        let current = state.current_size;
        let (action, bound_reason) = match direction {
            ScaleDirection::Up => {
                let target = self.ladder.step_up(current, self.scale_up_step);
                (Action::ScaleUp { target }, ReasonCode::AtCeiling)
            }
            ScaleDirection::Down => {
                let target = self.ladder.step_down(current, self.scale_down_step);
                (Action::ScaleDown { target }, ReasonCode::AtFloor)
            }
        };

        if action.target() == Some(current) {
            let mut decision = ScalingDecision::none(&id, bound_reason);
            decision.triggers = evaluation.triggers.clone();
            return decision;
        }

        ScalingDecision {
            cluster_id: id,
            action,
            reason: ReasonCode::Threshold,
            triggers: evaluation.triggers.clone(),
            forced: false,
        }
    }

    /// Operator override to an explicit tier. Skips evaluation and the
    /// guard; the target must still lie within the configured bounds.
    ///
    /// A target equal to the cached size is still issued remotely, as an
    /// up-direction resize: the cached size may be stale, and a confirmed
    /// success consumes an up slot like any other resize.
    pub fn force(&self, state: &ClusterState, target_label: &str) -> Result<ScalingDecision, TierError> {
        let target = self.ladder.bounded_index(target_label)?;
        let action = if target < state.current_size {
            Action::ScaleDown { target }
        } else {
            Action::ScaleUp { target }
        };

        Ok(ScalingDecision {
            cluster_id: state.cluster_id.clone(),
            action,
            reason: ReasonCode::Forced,
            triggers: vec![format!("forced to {target_label}")],
            forced: true,
        })
    }
}
