//! Shared fakes for daemon-level tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use dbscale_alert::{AlertChannel, AlertDispatcher, DeliveryError};
use dbscale_core::ports::{
    ClusterControl, CollectError, MetricReading, MetricsSource, ResizeAck, ResizeError,
    StatePersistence,
};
use dbscale_core::{Alert, ScalerConfig};
use dbscale_engine::{Collaborators, Controller, ManualClock};
use tokio::task::JoinHandle;

pub const EPOCH: u64 = 1_700_000_000;

pub const HOT: &[(&str, f64)] = &[
    ("cpu", 91.0),
    ("connections", 400.0),
    ("iops", 400.0),
    ("memory", 60.0),
];

pub const STEADY: &[(&str, f64)] = &[
    ("cpu", 55.0),
    ("connections", 400.0),
    ("iops", 400.0),
    ("memory", 60.0),
];

/// In-process stand-in for the managed-database API.
#[derive(Default)]
pub struct FakeAtlas {
    sizes: Mutex<BTreeMap<String, String>>,
    metrics: Mutex<BTreeMap<String, BTreeMap<String, f64>>>,
    pub resizes: Mutex<Vec<(String, String)>>,
}

impl FakeAtlas {
    pub fn with_clusters(clusters: &[(&str, &str)]) -> Arc<Self> {
        let atlas = Self::default();
        for (id, size) in clusters {
            atlas
                .sizes
                .lock()
                .unwrap()
                .insert(id.to_string(), size.to_string());
            atlas.set_metrics(id, STEADY);
        }
        Arc::new(atlas)
    }

    pub fn set_metrics(&self, cluster_id: &str, pairs: &[(&str, f64)]) {
        let values = pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect();
        self.metrics
            .lock()
            .unwrap()
            .insert(cluster_id.to_string(), values);
    }

    pub fn size_of(&self, cluster_id: &str) -> Option<String> {
        self.sizes.lock().unwrap().get(cluster_id).cloned()
    }
}

#[async_trait]
impl MetricsSource for FakeAtlas {
    async fn fetch(
        &self,
        cluster_id: &str,
        _metric_names: &[String],
    ) -> Result<MetricReading, CollectError> {
        let values = self
            .metrics
            .lock()
            .unwrap()
            .get(cluster_id)
            .cloned()
            .ok_or_else(|| CollectError::UnknownCluster(cluster_id.to_string()))?;
        Ok(MetricReading {
            timestamp: 0,
            values,
        })
    }
}

#[async_trait]
impl ClusterControl for FakeAtlas {
    async fn current_size(&self, cluster_id: &str) -> Result<String, ResizeError> {
        self.size_of(cluster_id)
            .ok_or_else(|| ResizeError::Rejected(format!("no cluster {cluster_id}")))
    }

    async fn resize(&self, cluster_id: &str, target_size: &str) -> Result<ResizeAck, ResizeError> {
        self.resizes
            .lock()
            .unwrap()
            .push((cluster_id.to_string(), target_size.to_string()));
        let mut sizes = self.sizes.lock().unwrap();
        if sizes.get(cluster_id).map(String::as_str) == Some(target_size) {
            return Ok(ResizeAck::AlreadyAtTarget);
        }
        sizes.insert(cluster_id.to_string(), target_size.to_string());
        Ok(ResizeAck::Accepted)
    }
}

/// Alert channel that remembers what it was handed.
#[derive(Default)]
pub struct CapturedAlerts {
    pub seen: Mutex<Vec<Alert>>,
}

#[async_trait]
impl AlertChannel for CapturedAlerts {
    fn name(&self) -> &'static str {
        "captured"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), DeliveryError> {
        self.seen.lock().unwrap().push(alert.clone());
        Ok(())
    }
}

pub struct Stack {
    pub controller: Controller,
    pub atlas: Arc<FakeAtlas>,
    pub alerts: Arc<CapturedAlerts>,
    pub alert_worker: JoinHandle<()>,
    pub clock: ManualClock,
}

/// Wire a controller the way the daemon does, with fakes at the edges.
pub async fn stack(
    config: &ScalerConfig,
    atlas: Arc<FakeAtlas>,
    store: Option<Arc<dyn StatePersistence>>,
    clock: ManualClock,
    clusters: &[&str],
) -> Stack {
    let alerts = Arc::new(CapturedAlerts::default());
    let (dispatcher, alert_worker) = AlertDispatcher::spawn(vec![alerts.clone() as Arc<dyn AlertChannel>], 64);

    let mut controller = Controller::new(
        config,
        Collaborators {
            metrics: atlas.clone(),
            control: atlas.clone(),
            alerts: Arc::new(dispatcher),
            store,
            clock: Arc::new(clock.clone()),
        },
    )
    .unwrap();
    for id in clusters {
        controller.add_cluster(id).await.unwrap();
    }

    Stack {
        controller,
        atlas,
        alerts,
        alert_worker,
        clock,
    }
}
