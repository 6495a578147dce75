//! Time sources for the control loop.
//!
//! Cooldowns and hourly windows are measured on the monotonic clock; wall
//! clock seconds are only used to stamp records leaving the engine.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Monotonic now.
    fn now(&self) -> Instant;

    /// Wall clock seconds since the Unix epoch.
    fn epoch_secs(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Headroom below the manual origin, so instants up to a week in the past
/// are representable even on a freshly booted host.
const MANUAL_HEADROOM: Duration = Duration::from_secs(7 * 24 * 3600);

/// Clock that only moves when told to. Clones share the same time.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualTime>>,
}

#[derive(Debug)]
struct ManualTime {
    origin: Instant,
    offset: Duration,
    epoch_origin: u64,
}

impl ManualClock {
    /// Start at `epoch_secs` wall time.
    pub fn new(epoch_secs: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualTime {
                origin: Instant::now() + MANUAL_HEADROOM,
                offset: Duration::ZERO,
                epoch_origin: epoch_secs,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut time = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        time.offset += by;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let time = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        time.origin + time.offset
    }

    fn epoch_secs(&self) -> u64 {
        let time = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        time.epoch_origin + time.offset.as_secs()
    }
}
