//! Ordered tier ladder with configured floor and ceiling.
//!
//! Sizes are handled as indices into the ladder; labels only appear at the
//! edges (config, persistence, the management API).

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TierError {
    #[error("tier ladder is empty")]
    Empty,

    #[error("tier `{0}` appears more than once in the ladder")]
    Duplicate(String),

    #[error("unknown tier `{0}`")]
    Unknown(String),

    #[error("min_instance_size {min} is above max_instance_size {max}")]
    InvertedBounds { min: String, max: String },

    #[error("tier `{tier}` is outside the allowed range {min}..={max}")]
    OutOfBounds {
        tier: String,
        min: String,
        max: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TierLadder {
    tiers: Vec<String>,
    min: usize,
    max: usize,
}

impl TierLadder {
    /// Instance sizes offered by the managed service, smallest first.
    pub const ATLAS_TIERS: &'static [&'static str] = &[
        "M0", "M2", "M5", "M10", "M20", "M30", "M40", "M50", "M60", "M80", "M100", "M140",
        "M200", "M300", "M400", "M500", "M600", "M700", "M800",
    ];

    pub fn new(tiers: Vec<String>, min: &str, max: &str) -> Result<Self, TierError> {
        if tiers.is_empty() {
            return Err(TierError::Empty);
        }
        for (i, tier) in tiers.iter().enumerate() {
            if tiers[..i].contains(tier) {
                return Err(TierError::Duplicate(tier.clone()));
            }
        }

        let position = |label: &str| {
            tiers
                .iter()
                .position(|t| t == label)
                .ok_or_else(|| TierError::Unknown(label.to_string()))
        };
        let min_idx = position(min)?;
        let max_idx = position(max)?;
        if min_idx > max_idx {
            return Err(TierError::InvertedBounds {
                min: min.to_string(),
                max: max.to_string(),
            });
        }

        Ok(Self {
            tiers,
            min: min_idx,
            max: max_idx,
        })
    }

    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.tiers.iter().position(|t| t == label)
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.tiers.get(index).map(String::as_str)
    }

    /// Index of the floor tier.
    pub fn min(&self) -> usize {
        self.min
    }

    /// Index of the ceiling tier.
    pub fn max(&self) -> usize {
        self.max
    }

    pub fn in_bounds(&self, index: usize) -> bool {
        (self.min..=self.max).contains(&index)
    }

    /// Resolve a label to an index inside `[min, max]`.
    pub fn bounded_index(&self, label: &str) -> Result<usize, TierError> {
        let index = self
            .index_of(label)
            .ok_or_else(|| TierError::Unknown(label.to_string()))?;
        if !self.in_bounds(index) {
            return Err(TierError::OutOfBounds {
                tier: label.to_string(),
                min: self.tiers[self.min].clone(),
                max: self.tiers[self.max].clone(),
            });
        }
        Ok(index)
    }

    /// Advance `steps` tiers, clamped to the ceiling.
    pub fn step_up(&self, from: usize, steps: u32) -> usize {
        from.saturating_add(steps as usize).min(self.max)
    }

    /// Retreat `steps` tiers, clamped to the floor.
    pub fn step_down(&self, from: usize, steps: u32) -> usize {
        from.saturating_sub(steps as usize).max(self.min)
    }
}
