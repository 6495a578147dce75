//! dbscale-state — durable state for the dbscale control loop.
//!
//! Backed by [redb](https://docs.rs/redb). Persists one `ClusterRecord` per
//! monitored cluster plus a bounded per-cluster log of `ScalingEvent`s, so a
//! restarted controller keeps its cooldown and rate-limit history.
//!
//! # Architecture
//!
//! Values are JSON-serialized into redb's `&[u8]` value columns. Event keys
//! are `{cluster_id}:{seq:020}`, so a range scan over one cluster's prefix
//! yields its events in insertion order.
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and implements `dbscale_core::ports::StatePersistence`.

pub mod error;
pub mod store;
pub mod tables;

pub use error::{StateError, StateResult};
pub use store::StateStore;
