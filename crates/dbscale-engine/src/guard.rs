//! Rate/cooldown guard.
//!
//! Decides whether a scale in a given direction is currently allowed for a
//! cluster. The guard only reads scale history (pruning expired window
//! entries as it goes); new scales are recorded by the executor after the
//! remote confirms them.

use std::time::{Duration, Instant};

use dbscale_core::ScaleDirection;
use dbscale_core::config::ScalingConfig;

use crate::cluster::ClusterState;

/// Why a scale is not permitted right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Disabled,
    Cooldown { remaining: Duration },
    RateLimited { count: usize, cap: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardPolicy {
    pub scale_up_cooldown: Duration,
    pub scale_down_cooldown: Duration,
    pub max_scale_up_per_hour: u32,
    pub max_scale_down_per_hour: u32,
}

impl GuardPolicy {
    pub fn from_config(config: &ScalingConfig) -> Self {
        Self {
            scale_up_cooldown: Duration::from_secs(config.scale_up_cooldown),
            scale_down_cooldown: Duration::from_secs(config.scale_down_cooldown),
            max_scale_up_per_hour: config.max_scale_up_per_hour,
            max_scale_down_per_hour: config.max_scale_down_per_hour,
        }
    }

    fn cooldown(&self, direction: ScaleDirection) -> Duration {
        match direction {
            ScaleDirection::Up => self.scale_up_cooldown,
            ScaleDirection::Down => self.scale_down_cooldown,
        }
    }

    fn cap(&self, direction: ScaleDirection) -> u32 {
        match direction {
            ScaleDirection::Up => self.max_scale_up_per_hour,
            ScaleDirection::Down => self.max_scale_down_per_hour,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Guard {
    policy: GuardPolicy,
}

impl Guard {
    pub fn new(policy: GuardPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GuardPolicy {
        &self.policy
    }

    /// Check whether `direction` is permitted for `state` at `now`.
    pub fn check(
        &self,
        state: &mut ClusterState,
        direction: ScaleDirection,
        now: Instant,
    ) -> Result<(), Denial> {
        if !state.enabled {
            return Err(Denial::Disabled);
        }

        let cooldown = self.policy.cooldown(direction);
        if let Some(last) = state.last_scale_at(direction) {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < cooldown {
                return Err(Denial::Cooldown {
                    remaining: cooldown - elapsed,
                });
            }
        }

        let cap = self.policy.cap(direction);
        let window = state.window_mut(direction);
        window.prune(now);
        let count = window.count(now);
        if count >= cap as usize {
            return Err(Denial::RateLimited { count, cap });
        }

        Ok(())
    }
}
