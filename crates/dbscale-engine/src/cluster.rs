//! Runtime control state of one cluster.
//!
//! Timestamps here are monotonic `Instant`s. The durable `ClusterRecord`
//! stores epoch seconds instead; conversion goes through a `Clock`.

use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};

use dbscale_core::{
    ClusterId, ClusterRecord, DimensionState, ScaleDirection, TierError, TierLadder,
};

use crate::clock::Clock;

/// Span of the hourly rate limit.
pub const HOUR: Duration = Duration::from_secs(3600);

/// Timestamps of successful scales within the trailing hour.
///
/// Expired entries are dropped lazily by `prune`.
#[derive(Debug, Clone, Default)]
pub struct RollingWindow {
    entries: VecDeque<Instant>,
}

impl RollingWindow {
    pub fn record(&mut self, at: Instant) {
        self.entries.push_back(at);
    }

    /// Drop entries 3600 s or more older than `now`.
    pub fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.entries.front() {
            if now.saturating_duration_since(oldest) >= HOUR {
                self.entries.pop_front();
            } else {
                break;
            }
        }
    }

    /// Entries inside `(now - 1h, now]`, without pruning.
    pub fn count(&self, now: Instant) -> usize {
        self.entries
            .iter()
            .filter(|&&at| at <= now && now.saturating_duration_since(at) < HOUR)
            .count()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instant> + '_ {
        self.entries.iter()
    }
}

#[derive(Debug, Clone)]
pub struct ClusterState {
    pub cluster_id: ClusterId,
    /// Index into the tier ladder.
    pub current_size: usize,
    pub enabled: bool,
    pub last_scale_up_at: Option<Instant>,
    pub last_scale_down_at: Option<Instant>,
    pub scale_up_timestamps: RollingWindow,
    pub scale_down_timestamps: RollingWindow,
    /// Last classification per metric, the hysteresis memory.
    pub dimensions: BTreeMap<String, DimensionState>,
}

impl ClusterState {
    /// Cold state: no cooldown or rate history.
    pub fn new(cluster_id: impl Into<ClusterId>, current_size: usize, enabled: bool) -> Self {
        Self {
            cluster_id: cluster_id.into(),
            current_size,
            enabled,
            last_scale_up_at: None,
            last_scale_down_at: None,
            scale_up_timestamps: RollingWindow::default(),
            scale_down_timestamps: RollingWindow::default(),
            dimensions: BTreeMap::new(),
        }
    }

    pub fn last_scale_at(&self, direction: ScaleDirection) -> Option<Instant> {
        match direction {
            ScaleDirection::Up => self.last_scale_up_at,
            ScaleDirection::Down => self.last_scale_down_at,
        }
    }

    pub fn window(&self, direction: ScaleDirection) -> &RollingWindow {
        match direction {
            ScaleDirection::Up => &self.scale_up_timestamps,
            ScaleDirection::Down => &self.scale_down_timestamps,
        }
    }

    pub fn window_mut(&mut self, direction: ScaleDirection) -> &mut RollingWindow {
        match direction {
            ScaleDirection::Up => &mut self.scale_up_timestamps,
            ScaleDirection::Down => &mut self.scale_down_timestamps,
        }
    }

    /// Bookkeeping for a confirmed resize.
    pub fn record_scale(&mut self, direction: ScaleDirection, target: usize, now: Instant) {
        self.current_size = target;
        match direction {
            ScaleDirection::Up => self.last_scale_up_at = Some(now),
            ScaleDirection::Down => self.last_scale_down_at = Some(now),
        }
        let window = self.window_mut(direction);
        window.prune(now);
        window.record(now);
    }

    // ── Durable form ──────────────────────────────────────────────

    pub fn to_record(&self, ladder: &TierLadder, clock: &dyn Clock) -> ClusterRecord {
        let now = clock.now();
        let epoch = clock.epoch_secs();
        let to_epoch =
            |at: &Instant| epoch.saturating_sub(now.saturating_duration_since(*at).as_secs());
        let window_epochs = |window: &RollingWindow| {
            window
                .iter()
                .filter(|at| now.saturating_duration_since(**at) < HOUR)
                .map(to_epoch)
                .collect::<Vec<u64>>()
        };

        ClusterRecord {
            cluster_id: self.cluster_id.clone(),
            current_size: ladder
                .label(self.current_size)
                .unwrap_or_default()
                .to_string(),
            enabled: self.enabled,
            last_scale_up_at: self.last_scale_up_at.as_ref().map(to_epoch),
            last_scale_down_at: self.last_scale_down_at.as_ref().map(to_epoch),
            scale_up_timestamps: window_epochs(&self.scale_up_timestamps),
            scale_down_timestamps: window_epochs(&self.scale_down_timestamps),
            dimensions: self.dimensions.clone(),
            updated_at: epoch,
        }
    }

    /// Rebuild runtime state from a persisted record.
    ///
    /// Window entries an hour or more old are dropped. A timestamp the
    /// monotonic clock cannot represent is clamped to now, which keeps its
    /// cooldown in force rather than forgetting it.
    pub fn from_record(
        record: &ClusterRecord,
        ladder: &TierLadder,
        clock: &dyn Clock,
    ) -> Result<Self, TierError> {
        let current_size = ladder.bounded_index(&record.current_size)?;
        let now = clock.now();
        let epoch = clock.epoch_secs();

        let to_instant = |ts: u64| {
            let age = Duration::from_secs(epoch.saturating_sub(ts));
            now.checked_sub(age).unwrap_or(now)
        };
        let to_window = |stamps: &[u64]| {
            let mut window = RollingWindow::default();
            let mut stamps: Vec<u64> = stamps
                .iter()
                .copied()
                .filter(|&ts| epoch.saturating_sub(ts) < HOUR.as_secs())
                .collect();
            stamps.sort_unstable();
            for ts in stamps {
                window.record(to_instant(ts));
            }
            window
        };

        Ok(Self {
            cluster_id: record.cluster_id.clone(),
            current_size,
            enabled: record.enabled,
            last_scale_up_at: record.last_scale_up_at.map(to_instant),
            last_scale_down_at: record.last_scale_down_at.map(to_instant),
            scale_up_timestamps: to_window(&record.scale_up_timestamps),
            scale_down_timestamps: to_window(&record.scale_down_timestamps),
            dimensions: record.dimensions.clone(),
        })
    }
}
