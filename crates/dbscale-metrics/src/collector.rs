//! Metric snapshot collector.
//!
//! Wraps a `MetricsSource` with the per-call I/O timeout and turns its
//! reading into an immutable `MetricSnapshot`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use dbscale_core::MetricSnapshot;
use dbscale_core::ports::{CollectError, MetricsSource};

/// Collects snapshots for the configured metric set.
#[derive(Clone)]
pub struct MetricsCollector {
    source: Arc<dyn MetricsSource>,
    metric_names: Vec<String>,
    timeout: Duration,
}

impl MetricsCollector {
    pub fn new(source: Arc<dyn MetricsSource>, metric_names: Vec<String>, timeout: Duration) -> Self {
        Self {
            source,
            metric_names,
            timeout,
        }
    }

    pub fn metric_names(&self) -> &[String] {
        &self.metric_names
    }

    /// Fetch current values for one cluster.
    ///
    /// Values for metrics outside the configured set are discarded, as are
    /// NaN and infinite values; both end up missing from the snapshot.
    /// `now` stamps the snapshot when the source reports no timestamp.
    pub async fn collect(&self, cluster_id: &str, now: u64) -> Result<MetricSnapshot, CollectError> {
        let reading = tokio::time::timeout(
            self.timeout,
            self.source.fetch(cluster_id, &self.metric_names),
        )
        .await
        .map_err(|_| CollectError::Timeout(self.timeout))??;

        let mut values = BTreeMap::new();
        for (name, value) in reading.values {
            if !self.metric_names.contains(&name) {
                debug!(%cluster_id, metric = %name, "ignoring unrequested metric");
                continue;
            }
            if !value.is_finite() {
                warn!(%cluster_id, metric = %name, value, "discarding non-finite metric value");
                continue;
            }
            values.insert(name, value);
        }

        let timestamp = if reading.timestamp == 0 {
            now
        } else {
            reading.timestamp
        };

        debug!(
            %cluster_id,
            present = values.len(),
            expected = self.metric_names.len(),
            "metrics collected"
        );

        Ok(MetricSnapshot {
            cluster_id: cluster_id.to_string(),
            timestamp,
            values,
        })
    }
}

/// Arithmetic mean, or `None` for an empty sample.
pub fn mean(samples: &[f64]) -> Option<f64> {
    if samples.is_empty() {
        return None;
    }
    Some(samples.iter().sum::<f64>() / samples.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use dbscale_core::ports::MetricReading;

    struct FixedSource {
        reading: MetricReading,
    }

    #[async_trait]
    impl MetricsSource for FixedSource {
        async fn fetch(
            &self,
            _cluster_id: &str,
            _metric_names: &[String],
        ) -> Result<MetricReading, CollectError> {
            Ok(self.reading.clone())
        }
    }

    struct SlowSource;

    #[async_trait]
    impl MetricsSource for SlowSource {
        async fn fetch(
            &self,
            _cluster_id: &str,
            _metric_names: &[String],
        ) -> Result<MetricReading, CollectError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(MetricReading::default())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl MetricsSource for BrokenSource {
        async fn fetch(
            &self,
            _cluster_id: &str,
            _metric_names: &[String],
        ) -> Result<MetricReading, CollectError> {
            Err(CollectError::Transport("connection refused".to_string()))
        }
    }

    fn names() -> Vec<String> {
        vec!["cpu".to_string(), "memory".to_string()]
    }

    #[tokio::test]
    async fn collect_filters_unknown_and_non_finite() {
        let reading = MetricReading {
            timestamp: 1234,
            values: [
                ("cpu".to_string(), 85.0),
                ("memory".to_string(), f64::NAN),
                ("disk".to_string(), 10.0),
            ]
            .into_iter()
            .collect(),
        };
        let collector =
            MetricsCollector::new(Arc::new(FixedSource { reading }), names(), Duration::from_secs(1));

        let snap = collector.collect("orders", 99).await.unwrap();
        assert_eq!(snap.cluster_id, "orders");
        assert_eq!(snap.timestamp, 1234);
        assert_eq!(snap.values.len(), 1);
        assert_eq!(snap.values["cpu"], 85.0);
    }

    #[tokio::test]
    async fn collect_stamps_missing_timestamp() {
        let collector = MetricsCollector::new(
            Arc::new(FixedSource {
                reading: MetricReading::default(),
            }),
            names(),
            Duration::from_secs(1),
        );
        let snap = collector.collect("orders", 99).await.unwrap();
        assert_eq!(snap.timestamp, 99);
        assert!(snap.values.is_empty());
    }

    #[tokio::test]
    async fn collect_times_out() {
        let collector = MetricsCollector::new(Arc::new(SlowSource), names(), Duration::from_millis(20));
        let err = collector.collect("orders", 0).await.unwrap_err();
        assert!(matches!(err, CollectError::Timeout(_)));
    }

    #[tokio::test]
    async fn collect_propagates_transport_error() {
        let collector = MetricsCollector::new(Arc::new(BrokenSource), names(), Duration::from_secs(1));
        let err = collector.collect("orders", 0).await.unwrap_err();
        assert!(matches!(err, CollectError::Transport(_)));
    }

    #[test]
    fn mean_values() {
        assert_eq!(mean(&[]), None);
        assert_eq!(mean(&[10.0, 20.0, 30.0]), Some(20.0));
    }
}
