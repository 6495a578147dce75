//! JSON bodies exchanged with the Atlas API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dbscale_metrics::mean;

#[derive(Debug, Clone, Deserialize)]
pub struct ClusterList {
    #[serde(default)]
    pub results: Vec<ClusterInfo>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInfo {
    pub name: String,
    #[serde(default)]
    pub state_name: Option<String>,
    #[serde(default)]
    pub provider_settings: Option<ProviderSettings>,
}

impl ClusterInfo {
    pub fn instance_size(&self) -> Option<&str> {
        self.provider_settings
            .as_ref()
            .and_then(|p| p.instance_size_name.as_deref())
    }

    /// `IDLE` means no plan is running against the cluster.
    pub fn is_idle(&self) -> bool {
        self.state_name.as_deref() == Some("IDLE")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_size_name: Option<String>,
}

/// PATCH body for a tier change.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeRequest {
    pub provider_settings: ProviderSettings,
}

impl ResizeRequest {
    pub fn to_size(size: &str) -> Self {
        Self {
            provider_settings: ProviderSettings {
                instance_size_name: Some(size.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MeasurementsResponse {
    #[serde(default)]
    pub measurements: Vec<Measurement>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measurement {
    pub name: String,
    #[serde(default)]
    pub data_points: Vec<DataPoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DataPoint {
    #[serde(default)]
    pub value: Option<f64>,
}

/// Average each requested metric over the returned datapoints.
///
/// `measurements` maps metric names to Atlas measurement identifiers.
/// Null datapoints are skipped; a metric with no usable datapoint is left
/// out of the result.
pub fn average_measurements(
    response: &MeasurementsResponse,
    measurements: &BTreeMap<String, String>,
    metric_names: &[String],
) -> BTreeMap<String, f64> {
    let mut values = BTreeMap::new();
    for name in metric_names {
        let Some(id) = measurements.get(name) else {
            continue;
        };
        let points: Vec<f64> = response
            .measurements
            .iter()
            .filter(|m| &m.name == id)
            .flat_map(|m| m.data_points.iter().filter_map(|p| p.value))
            .collect();
        if let Some(avg) = mean(&points) {
            values.insert(name.clone(), avg);
        }
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> BTreeMap<String, String> {
        [("cpu", "CPU_USAGE"), ("memory", "MEMORY_USAGE"), ("iops", "DISK_IOPS")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn averages_skip_nulls() {
        let response: MeasurementsResponse = serde_json::from_value(serde_json::json!({
            "measurements": [
                { "name": "CPU_USAGE", "dataPoints": [{ "value": 70.0 }, { "value": null }, { "value": 90.0 }] },
                { "name": "MEMORY_USAGE", "dataPoints": [{ "value": 50.0 }] }
            ]
        }))
        .unwrap();

        let values = average_measurements(&response, &mapping(), &names(&["cpu", "memory"]));
        assert_eq!(values["cpu"], 80.0);
        assert_eq!(values["memory"], 50.0);
    }

    #[test]
    fn empty_or_absent_series_is_missing() {
        let response: MeasurementsResponse = serde_json::from_value(serde_json::json!({
            "measurements": [
                { "name": "CPU_USAGE", "dataPoints": [{ "value": null }] },
                { "name": "DISK_IOPS", "dataPoints": [] }
            ]
        }))
        .unwrap();

        let values = average_measurements(&response, &mapping(), &names(&["cpu", "iops", "memory"]));
        assert!(values.is_empty());
    }

    #[test]
    fn unmapped_metric_is_ignored() {
        let response = MeasurementsResponse::default();
        let values = average_measurements(&response, &mapping(), &names(&["replication_lag"]));
        assert!(values.is_empty());
    }

    #[test]
    fn cluster_info_reads_provider_settings() {
        let info: ClusterInfo = serde_json::from_value(serde_json::json!({
            "name": "orders",
            "stateName": "IDLE",
            "providerSettings": { "instanceSizeName": "M30", "providerName": "AWS" }
        }))
        .unwrap();
        assert_eq!(info.instance_size(), Some("M30"));
        assert!(info.is_idle());
    }

    #[test]
    fn resize_body_shape() {
        let body = serde_json::to_value(ResizeRequest::to_size("M40")).unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "providerSettings": { "instanceSizeName": "M40" } })
        );
    }
}
