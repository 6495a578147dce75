//! dbscale-core — shared vocabulary for the dbscale workspace.
//!
//! Holds the configuration model (`dbscale.toml`), the ordered tier ladder,
//! the domain records exchanged between crates, and the collaborator ports
//! the control loop consumes (metrics source, cluster control, alert sink,
//! state persistence).

pub mod config;
pub mod ports;
pub mod tier;
pub mod types;

pub use config::{ConfigError, ScalerConfig, ThresholdPolicy};
pub use tier::{TierError, TierLadder};
pub use types::*;
