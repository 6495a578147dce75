//! HTTP client for the Atlas admin API.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, warn};

use dbscale_core::config::ApiConfig;
use dbscale_core::ports::{
    ClusterControl, CollectError, MetricReading, MetricsSource, ResizeAck, ResizeError,
};

use crate::wire::{
    ClusterInfo, ClusterList, MeasurementsResponse, ResizeRequest, average_measurements,
};

#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("no API token configured")]
    MissingToken,

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API answered {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("cluster {0} reports no instance size")]
    NoInstanceSize(String),
}

impl AtlasError {
    fn status(&self) -> Option<StatusCode> {
        match self {
            AtlasError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<AtlasError> for CollectError {
    fn from(e: AtlasError) -> Self {
        match e.status() {
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                CollectError::Auth(e.to_string())
            }
            Some(StatusCode::NOT_FOUND) => CollectError::UnknownCluster(e.to_string()),
            _ => CollectError::Transport(e.to_string()),
        }
    }
}

impl From<AtlasError> for ResizeError {
    fn from(e: AtlasError) -> Self {
        match e.status() {
            Some(StatusCode::CONFLICT) => ResizeError::Conflict(e.to_string()),
            Some(StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => {
                ResizeError::Transport(e.to_string())
            }
            Some(s) if s.is_client_error() => ResizeError::Rejected(e.to_string()),
            _ => ResizeError::Transport(e.to_string()),
        }
    }
}

/// Atlas admin API client scoped to one project.
#[derive(Debug, Clone)]
pub struct AtlasClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    token: String,
    measurements: BTreeMap<String, String>,
    lookback: Duration,
    granularity: String,
}

impl AtlasClient {
    pub fn new(config: &ApiConfig) -> Result<Self, AtlasError> {
        let token = config.token.clone().ok_or(AtlasError::MissingToken)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            project_id: config.project_id.clone(),
            token,
            measurements: config.measurements.clone(),
            lookback: Duration::from_secs(config.metrics_lookback),
            granularity: config.granularity.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/groups/{}{}", self.base_url, self.project_id, path)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&ResizeRequest>,
    ) -> Result<T, AtlasError> {
        let url = self.url(path);
        let mut request = self
            .http
            .request(method.clone(), &url)
            .bearer_auth(&self.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        debug!(%method, %url, %status, "atlas request");
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AtlasError::Status { status, body });
        }
        Ok(response.json::<T>().await?)
    }

    pub async fn list_clusters(&self) -> Result<Vec<ClusterInfo>, AtlasError> {
        let list: ClusterList = self.send(Method::GET, "/clusters", &[], None).await?;
        Ok(list.results)
    }

    pub async fn cluster(&self, name: &str) -> Result<ClusterInfo, AtlasError> {
        self.send(Method::GET, &format!("/clusters/{name}"), &[], None)
            .await
    }

    async fn measurements(
        &self,
        cluster_id: &str,
        metric_names: &[String],
    ) -> Result<MeasurementsResponse, AtlasError> {
        let mut query: Vec<(&str, String)> = metric_names
            .iter()
            .filter_map(|name| self.measurements.get(name))
            .map(|id| ("m", id.clone()))
            .collect();
        query.push(("granularity", self.granularity.clone()));
        query.push(("period", format!("PT{}S", self.lookback.as_secs())));

        let path = format!("/clusters/{cluster_id}/processes/{cluster_id}/measurements");
        self.send(Method::GET, &path, &query, None).await
    }
}

#[async_trait]
impl MetricsSource for AtlasClient {
    async fn fetch(
        &self,
        cluster_id: &str,
        metric_names: &[String],
    ) -> Result<MetricReading, CollectError> {
        let response = self.measurements(cluster_id, metric_names).await?;
        let values = average_measurements(&response, &self.measurements, metric_names);
        for name in metric_names.iter().filter(|n| !values.contains_key(*n)) {
            debug!(%cluster_id, metric = %name, "no datapoints in lookback window");
        }
        Ok(MetricReading {
            timestamp: 0,
            values,
        })
    }
}

#[async_trait]
impl ClusterControl for AtlasClient {
    async fn current_size(&self, cluster_id: &str) -> Result<String, ResizeError> {
        let info = self.cluster(cluster_id).await?;
        info.instance_size()
            .map(str::to_string)
            .ok_or_else(|| AtlasError::NoInstanceSize(cluster_id.to_string()).into())
    }

    async fn resize(&self, cluster_id: &str, target_size: &str) -> Result<ResizeAck, ResizeError> {
        let info = self.cluster(cluster_id).await?;
        if info.instance_size() == Some(target_size) {
            return Ok(ResizeAck::AlreadyAtTarget);
        }
        if !info.is_idle() {
            warn!(%cluster_id, state = ?info.state_name, "resizing a cluster that is not idle");
        }

        let _: serde_json::Value = self
            .send(
                Method::PATCH,
                &format!("/clusters/{cluster_id}"),
                &[],
                Some(&ResizeRequest::to_size(target_size)),
            )
            .await?;
        Ok(ResizeAck::Accepted)
    }
}
