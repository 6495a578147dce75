//! redb table definitions for the dbscale state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).

use redb::TableDefinition;

/// Cluster records keyed by `{cluster_id}`.
pub const CLUSTERS: TableDefinition<&str, &[u8]> = TableDefinition::new("clusters");

/// Scaling events keyed by `{cluster_id}:{seq:020}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");
