//! dbscale-metrics — metric snapshots for the control loop.
//!
//! Pulls current metric values for one cluster from a `MetricsSource`,
//! bounds the fetch with a timeout, and normalizes the result into a
//! `MetricSnapshot`. Also renders cluster status as Prometheus text.
//!
//! # Architecture
//!
//! ```text
//! MetricsCollector
//!   ├── collect() → MetricsSource::fetch() under tokio timeout
//!   └── drops unknown and non-finite values (reported as missing)
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{MetricsCollector, mean};
pub use prometheus::render_prometheus;
