//! dbscale-engine — the decision-and-control loop.
//!
//! Classifies metric snapshots with hysteresis, gates scaling through
//! per-cluster cooldowns and hourly rate limits, resizes clusters through
//! the `ClusterControl` port, and keeps bounded per-cluster history.
//!
//! # Tick pipeline
//!
//! ```text
//! MetricsCollector::collect()
//!   → health::evaluate()            per-metric High/Normal/Low + overall signal
//!   → DecisionEngine::decide()      consults Guard (enabled, cooldown, hourly cap)
//!   → Executor::execute()           resize, bookkeeping on success only
//!   → History                       ring buffers of snapshots and events
//!   → AlertSink::notify()
//! ```
//!
//! Each cluster's pipeline owns its `ClusterState` for the duration of a
//! tick; pipelines for different clusters run concurrently.

pub mod clock;
pub mod cluster;
pub mod controller;
pub mod decision;
pub mod executor;
pub mod guard;
pub mod health;
pub mod history;

pub use clock::{Clock, ManualClock, SystemClock};
pub use cluster::{ClusterState, RollingWindow};
pub use controller::{
    CheckReport, Collaborators, ControlError, Controller, ControllerHandle,
};
pub use decision::{Action, DecisionEngine, ReasonCode, ScalingDecision};
pub use executor::Executor;
pub use guard::{Denial, Guard, GuardPolicy};
pub use health::{Evaluation, OverallSignal};
pub use history::{History, RingBuffer};
