//! Prometheus text exposition format.
//!
//! Renders cluster status into the Prometheus text exposition format
//! for scraping by a Prometheus server or compatible agent.

use std::fmt::Write;

use dbscale_core::{ClusterStatus, DimensionState};

/// Render cluster status into Prometheus text format.
///
/// Produces GAUGE metrics with `cluster` labels.
pub fn render_prometheus(clusters: &[ClusterStatus]) -> String {
    let mut out = String::new();

    gauge_header(&mut out, "dbscale_cluster_info", "Current tier of the cluster (always 1).");
    for c in clusters {
        let _ = writeln!(
            out,
            "dbscale_cluster_info{{cluster=\"{}\",size=\"{}\"}} 1",
            c.cluster_id, c.current_size
        );
    }

    gauge_header(&mut out, "dbscale_scaling_enabled", "Whether autoscaling is enabled (1) or disabled (0).");
    for c in clusters {
        let _ = writeln!(
            out,
            "dbscale_scaling_enabled{{cluster=\"{}\"}} {}",
            c.cluster_id,
            u8::from(c.enabled)
        );
    }

    gauge_header(&mut out, "dbscale_scale_ups_last_hour", "Successful scale-ups in the trailing hour.");
    for c in clusters {
        let _ = writeln!(
            out,
            "dbscale_scale_ups_last_hour{{cluster=\"{}\"}} {}",
            c.cluster_id, c.scale_ups_last_hour
        );
    }

    gauge_header(&mut out, "dbscale_scale_downs_last_hour", "Successful scale-downs in the trailing hour.");
    for c in clusters {
        let _ = writeln!(
            out,
            "dbscale_scale_downs_last_hour{{cluster=\"{}\"}} {}",
            c.cluster_id, c.scale_downs_last_hour
        );
    }

    gauge_header(&mut out, "dbscale_metric_value", "Latest collected metric value.");
    for c in clusters {
        let Some(latest) = c.recent_snapshots.first() else {
            continue;
        };
        for (metric, value) in &latest.values {
            let _ = writeln!(
                out,
                "dbscale_metric_value{{cluster=\"{}\",metric=\"{}\"}} {:.2}",
                c.cluster_id, metric, value
            );
        }
    }

    gauge_header(&mut out, "dbscale_dimension_state", "Hysteresis state per metric (-1 low, 0 normal, 1 high).");
    for c in clusters {
        for (metric, state) in &c.dimensions {
            let value = match state {
                DimensionState::Low => -1,
                DimensionState::Normal => 0,
                DimensionState::High => 1,
            };
            let _ = writeln!(
                out,
                "dbscale_dimension_state{{cluster=\"{}\",metric=\"{}\"}} {}",
                c.cluster_id, metric, value
            );
        }
    }

    out
}

fn gauge_header(out: &mut String, name: &str, help: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} gauge");
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbscale_core::MetricSnapshot;
    use std::collections::BTreeMap;

    fn test_status(cluster_id: &str) -> ClusterStatus {
        ClusterStatus {
            cluster_id: cluster_id.to_string(),
            current_size: "M30".to_string(),
            enabled: true,
            last_scale_up_at: Some(1000),
            last_scale_down_at: None,
            scale_ups_last_hour: 2,
            scale_downs_last_hour: 0,
            dimensions: [
                ("cpu".to_string(), DimensionState::High),
                ("memory".to_string(), DimensionState::Low),
            ]
            .into_iter()
            .collect(),
            recent_events: vec![],
            recent_snapshots: vec![MetricSnapshot {
                cluster_id: cluster_id.to_string(),
                timestamp: 1000,
                values: [("cpu".to_string(), 85.5)].into_iter().collect(),
            }],
        }
    }

    #[test]
    fn render_empty() {
        let output = render_prometheus(&[]);
        // Should still have type declarations.
        assert!(output.contains("# HELP dbscale_cluster_info"));
        assert!(output.contains("# TYPE dbscale_scaling_enabled gauge"));
    }

    #[test]
    fn render_single_cluster() {
        let output = render_prometheus(&[test_status("orders")]);

        assert!(output.contains("dbscale_cluster_info{cluster=\"orders\",size=\"M30\"} 1"));
        assert!(output.contains("dbscale_scaling_enabled{cluster=\"orders\"} 1"));
        assert!(output.contains("dbscale_scale_ups_last_hour{cluster=\"orders\"} 2"));
        assert!(output.contains("dbscale_metric_value{cluster=\"orders\",metric=\"cpu\"} 85.50"));
        assert!(output.contains("dbscale_dimension_state{cluster=\"orders\",metric=\"cpu\"} 1"));
        assert!(output.contains("dbscale_dimension_state{cluster=\"orders\",metric=\"memory\"} -1"));
    }

    #[test]
    fn render_skips_clusters_without_snapshots() {
        let mut status = test_status("idle");
        status.recent_snapshots.clear();
        status.dimensions = BTreeMap::new();
        let output = render_prometheus(&[status]);
        assert!(!output.contains("dbscale_metric_value{cluster=\"idle\""));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus(&[test_status("a"), test_status("b")]);

        // Every non-empty, non-comment line should match: metric_name{labels} value
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
        }
    }
}
