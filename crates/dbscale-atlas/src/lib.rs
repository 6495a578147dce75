//! dbscale-atlas — the managed-database REST API behind the control loop.
//!
//! `AtlasClient` implements both `MetricsSource` and `ClusterControl`, so a
//! single client instance is shared by the collector and the executor.

pub mod client;
pub mod wire;

pub use client::{AtlasClient, AtlasError};
pub use wire::{ClusterInfo, average_measurements};
