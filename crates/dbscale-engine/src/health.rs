//! Health evaluation — per-metric classification with hysteresis.
//!
//! A metric enters `High` only at or above its high threshold and `Low` only
//! at or below its low threshold. Between the two it keeps whatever extreme
//! it was last in, so a value wandering inside the dead band never flips.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use dbscale_core::{DimensionState, MetricSnapshot, ThresholdPolicy};
use dbscale_metrics::mean;

/// Aggregate signal for one cluster and tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallSignal {
    /// At least one present dimension is high.
    High,
    Normal,
    /// Every present dimension is low.
    Low,
}

/// Result of evaluating one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub signal: OverallSignal,
    /// New classification per configured metric. Missing metrics keep
    /// their prior state.
    pub dimensions: BTreeMap<String, DimensionState>,
    /// Configured metrics absent from the snapshot.
    pub missing: Vec<String>,
    /// Every configured metric was missing.
    pub degraded: bool,
    /// Dimensions behind the signal, e.g. `cpu=85.0 >= 80`.
    pub triggers: Vec<String>,
    /// Dimensions that moved into `High` on this evaluation.
    pub entered_high: Vec<String>,
}

/// Classify one value against its policy and prior state.
pub fn classify(value: f64, prior: DimensionState, policy: &ThresholdPolicy) -> DimensionState {
    if value >= policy.high {
        DimensionState::High
    } else if value <= policy.low {
        DimensionState::Low
    } else {
        match prior {
            DimensionState::High | DimensionState::Low => prior,
            DimensionState::Normal => DimensionState::Normal,
        }
    }
}

/// Evaluate a set of metric values for one cluster.
pub fn evaluate(
    values: &BTreeMap<String, f64>,
    prior: &BTreeMap<String, DimensionState>,
    policies: &BTreeMap<String, ThresholdPolicy>,
) -> Evaluation {
    let mut dimensions = BTreeMap::new();
    let mut missing = Vec::new();
    let mut entered_high = Vec::new();
    let mut high = Vec::new();
    let mut low = Vec::new();
    let mut present = 0usize;

    for (name, policy) in policies {
        let before = prior.get(name).copied().unwrap_or_default();
        let Some(&value) = values.get(name).filter(|v| v.is_finite()) else {
            missing.push(name.clone());
            dimensions.insert(name.clone(), before);
            continue;
        };
        present += 1;

        let state = classify(value, before, policy);
        match state {
            DimensionState::High => {
                if before != DimensionState::High {
                    entered_high.push(format!("{name}={value:.1} >= {}", policy.high));
                }
                high.push(describe(name, value, state, policy));
            }
            DimensionState::Low => low.push(describe(name, value, state, policy)),
            DimensionState::Normal => {}
        }
        dimensions.insert(name.clone(), state);
    }

    let degraded = present == 0;
    let (signal, triggers) = if degraded {
        (OverallSignal::Normal, Vec::new())
    } else if !high.is_empty() {
        (OverallSignal::High, high)
    } else if low.len() == present {
        (OverallSignal::Low, low)
    } else {
        (OverallSignal::Normal, Vec::new())
    };

    debug!(?signal, present, missing = missing.len(), "evaluated dimensions");

    Evaluation {
        signal,
        dimensions,
        missing,
        degraded,
        triggers,
        entered_high,
    }
}

fn describe(name: &str, value: f64, state: DimensionState, policy: &ThresholdPolicy) -> String {
    match state {
        DimensionState::High if value >= policy.high => {
            format!("{name}={value:.1} >= {}", policy.high)
        }
        DimensionState::Low if value <= policy.low => {
            format!("{name}={value:.1} <= {}", policy.low)
        }
        DimensionState::High => format!("{name}={value:.1} (holding high)"),
        DimensionState::Low => format!("{name}={value:.1} (holding low)"),
        DimensionState::Normal => format!("{name}={value:.1}"),
    }
}

/// Values to classify for `current`, averaged per metric over `current` and
/// up to `window - 1` earlier snapshots (most recent first). A window of 0
/// or 1 returns the raw values.
pub fn smoothed_values<'a>(
    current: &MetricSnapshot,
    earlier: impl Iterator<Item = &'a MetricSnapshot>,
    window: usize,
) -> BTreeMap<String, f64> {
    if window <= 1 {
        return current.values.clone();
    }

    let earlier: Vec<&MetricSnapshot> = earlier.take(window - 1).collect();
    current
        .values
        .iter()
        .filter_map(|(name, &value)| {
            let samples: Vec<f64> = std::iter::once(value)
                .chain(earlier.iter().filter_map(|s| s.values.get(name).copied()))
                .collect();
            mean(&samples).map(|avg| (name.clone(), avg))
        })
        .collect()
}
