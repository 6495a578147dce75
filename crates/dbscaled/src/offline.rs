//! Read-only status from the state store, for use without API access.

use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;

use dbscale_core::{ClusterRecord, ClusterStatus, ScalerConfig};
use dbscale_state::StateStore;

const HOUR_SECS: u64 = 3600;

pub fn status(
    config: &ScalerConfig,
    cluster: Option<&str>,
    limit: usize,
) -> anyhow::Result<Vec<ClusterStatus>> {
    let path = &config.state.path;
    if !path.exists() {
        anyhow::bail!("no state store at {}", path.display());
    }
    let store = StateStore::open(path).with_context(|| format!("opening {}", path.display()))?;

    let records = match cluster {
        Some(id) => vec![
            store
                .get_cluster(id)?
                .with_context(|| format!("no persisted state for cluster {id}"))?,
        ],
        None => store.list_clusters()?,
    };

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();

    records
        .into_iter()
        .map(|record| {
            let events = store.list_events_for_cluster(&record.cluster_id, limit)?;
            Ok(status_from_record(record, events, now))
        })
        .collect()
}

fn status_from_record(
    record: ClusterRecord,
    recent_events: Vec<dbscale_core::ScalingEvent>,
    now: u64,
) -> ClusterStatus {
    let in_last_hour = |ts: &[u64]| ts.iter().filter(|&&t| now.saturating_sub(t) < HOUR_SECS).count();
    ClusterStatus {
        scale_ups_last_hour: in_last_hour(&record.scale_up_timestamps),
        scale_downs_last_hour: in_last_hour(&record.scale_down_timestamps),
        cluster_id: record.cluster_id,
        current_size: record.current_size,
        enabled: record.enabled,
        last_scale_up_at: record.last_scale_up_at,
        last_scale_down_at: record.last_scale_down_at,
        dimensions: record.dimensions,
        recent_events,
        recent_snapshots: Vec::new(),
    }
}
