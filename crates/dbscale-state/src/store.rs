//! StateStore — redb-backed persistence for cluster records and events.
//!
//! Provides typed operations over the `clusters` and `events` tables. All
//! values are JSON-serialized into redb's `&[u8]` value columns. The store
//! supports both on-disk and in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, DatabaseError, ReadableDatabase, ReadableTable};
use tracing::debug;

use dbscale_core::ports::{PersistError, StatePersistence};
use dbscale_core::{ClusterRecord, ScalingEvent};

use crate::error::{StateError, StateResult};
use crate::tables::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Width of the zero-padded sequence number in event keys.
const SEQ_WIDTH: usize = 20;

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(|e| match e {
            DatabaseError::DatabaseAlreadyOpen => StateError::Locked(path.display().to_string()),
            other => StateError::Open(other.to_string()),
        })?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Cluster records ────────────────────────────────────────────

    /// Insert or replace a cluster record.
    pub fn put_cluster(&self, record: &ClusterRecord) -> StateResult<()> {
        let value = serde_json::to_vec(record).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            table
                .insert(record.cluster_id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(cluster = %record.cluster_id, size = %record.current_size, "cluster record stored");
        Ok(())
    }

    pub fn get_cluster(&self, cluster_id: &str) -> StateResult<Option<ClusterRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        match table.get(cluster_id).map_err(map_err!(Read))? {
            Some(guard) => {
                let record: ClusterRecord =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    pub fn list_clusters(&self) -> StateResult<Vec<ClusterRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let record: ClusterRecord =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(results)
    }

    /// Delete a cluster record and its event log. Returns true if the record existed.
    pub fn delete_cluster(&self, cluster_id: &str) -> StateResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut clusters = txn.open_table(CLUSTERS).map_err(map_err!(Table))?;
            existed = clusters.remove(cluster_id).map_err(map_err!(Write))?.is_some();

            let mut events = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            for key in event_keys(&events, cluster_id)? {
                events.remove(key.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%cluster_id, existed, "cluster record deleted");
        Ok(existed)
    }

    // ── Scaling events ─────────────────────────────────────────────

    /// Append an event and trim the cluster's log to the newest `keep` entries.
    ///
    /// Returns the sequence number assigned to the event.
    pub fn append_event(&self, event: &ScalingEvent, keep: usize) -> StateResult<u64> {
        let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let prefix = event_prefix(&event.cluster_id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let seq;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            let existing = event_keys(&table, &event.cluster_id)?;
            seq = existing
                .last()
                .and_then(|k| k[prefix.len()..].parse::<u64>().ok())
                .map_or(0, |last| last + 1);

            let key = format!("{prefix}{seq:020}");
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let total = existing.len() + 1;
            if total > keep {
                for stale in existing.iter().take(total - keep) {
                    table.remove(stale.as_str()).map_err(map_err!(Write))?;
                }
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(seq)
    }

    /// Recent events for a cluster, most recent first.
    pub fn list_events_for_cluster(
        &self,
        cluster_id: &str,
        limit: usize,
    ) -> StateResult<Vec<ScalingEvent>> {
        let prefix = event_prefix(cluster_id);
        let end = event_range_end(cluster_id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table
            .range(prefix.as_str()..end.as_str())
            .map_err(map_err!(Read))?
            .rev()
        {
            if results.len() >= limit {
                break;
            }
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !is_event_key(key.value(), &prefix) {
                continue;
            }
            let event: ScalingEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        Ok(results)
    }
}

impl StatePersistence for StateStore {
    fn load(&self, cluster_id: &str) -> Result<Option<ClusterRecord>, PersistError> {
        Ok(self.get_cluster(cluster_id)?)
    }

    fn save(&self, record: &ClusterRecord) -> Result<(), PersistError> {
        Ok(self.put_cluster(record)?)
    }

    fn append_event(&self, event: &ScalingEvent, keep: usize) -> Result<(), PersistError> {
        StateStore::append_event(self, event, keep)?;
        Ok(())
    }

    fn recent_events(
        &self,
        cluster_id: &str,
        limit: usize,
    ) -> Result<Vec<ScalingEvent>, PersistError> {
        Ok(self.list_events_for_cluster(cluster_id, limit)?)
    }
}

fn event_prefix(cluster_id: &str) -> String {
    format!("{cluster_id}:")
}

/// Exclusive upper bound of a cluster's key range (`:` + 1 == `;`).
fn event_range_end(cluster_id: &str) -> String {
    format!("{cluster_id};")
}

/// The range scan also matches ids that extend the prefix (`a:b:...` for `a`).
fn is_event_key(key: &str, prefix: &str) -> bool {
    key.strip_prefix(prefix)
        .is_some_and(|seq| seq.len() == SEQ_WIDTH && seq.bytes().all(|b| b.is_ascii_digit()))
}

/// Keys of one cluster's events in ascending sequence order.
fn event_keys(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    cluster_id: &str,
) -> StateResult<Vec<String>> {
    let prefix = event_prefix(cluster_id);
    let end = event_range_end(cluster_id);
    let mut keys = Vec::new();
    for entry in table
        .range(prefix.as_str()..end.as_str())
        .map_err(map_err!(Read))?
    {
        let (key, _) = entry.map_err(map_err!(Read))?;
        if is_event_key(key.value(), &prefix) {
            keys.push(key.value().to_string());
        }
    }
    Ok(keys)
}
