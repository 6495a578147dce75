//! Subsystem wiring shared by the long-running and one-shot commands.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use dbscale_alert::AlertDispatcher;
use dbscale_atlas::AtlasClient;
use dbscale_core::ScalerConfig;
use dbscale_core::ports::StatePersistence;
use dbscale_engine::{Collaborators, Controller, SystemClock};
use dbscale_state::StateStore;

/// A fully wired controller plus the alert worker it feeds.
pub struct Daemon {
    pub controller: Controller,
    pub alert_worker: JoinHandle<()>,
    pub alert_drain: Duration,
}

impl Daemon {
    /// Open the state store, connect to the API, and register clusters.
    ///
    /// With `only` set, just that cluster is registered. Otherwise the
    /// configured list is used, or every cluster in the project when the
    /// list is empty.
    pub async fn build(config: &ScalerConfig, only: Option<&str>) -> anyhow::Result<Self> {
        // ── Initialize subsystems ──────────────────────────────────

        let store = open_store(config)?;

        let client = Arc::new(AtlasClient::new(&config.api).context("creating API client")?);
        info!(base_url = %config.api.base_url, project = %config.api.project_id, "API client initialized");

        let (dispatcher, alert_worker) = AlertDispatcher::from_config(&config.alerts)?;

        let deps = Collaborators {
            metrics: client.clone(),
            control: client.clone(),
            alerts: Arc::new(dispatcher),
            store,
            clock: Arc::new(SystemClock),
        };
        let mut controller = Controller::new(config, deps)?;

        // ── Clusters ───────────────────────────────────────────────

        // Listing the project doubles as the credential check, so a bad
        // token fails here rather than on the first tick.
        let discovered: Vec<String> = client
            .list_clusters()
            .await
            .context("connecting to the management API")?
            .into_iter()
            .map(|c| c.name)
            .collect();
        info!(count = discovered.len(), "management API reachable");

        let clusters = match only {
            Some(id) => vec![id.to_string()],
            None if !config.clusters.is_empty() => config.clusters.clone(),
            None => discovered.clone(),
        };
        for cluster_id in clusters.iter().filter(|id| !discovered.contains(id)) {
            warn!(%cluster_id, "cluster not listed in project");
        }

        for cluster_id in &clusters {
            controller
                .add_cluster(cluster_id)
                .await
                .with_context(|| format!("registering cluster {cluster_id}"))?;
        }
        info!(clusters = clusters.len(), "controller initialized");

        Ok(Self {
            controller,
            alert_worker,
            alert_drain: Duration::from_secs(config.alerts.timeout.saturating_mul(2).max(1)),
        })
    }

    /// Drop the controller and give queued alerts a chance to go out.
    pub async fn finish(self) {
        let Self {
            controller,
            alert_worker,
            alert_drain,
        } = self;
        drop(controller);
        drain_alerts(alert_worker, alert_drain).await;
    }
}

/// Wait for the alert worker to empty its queue, up to `limit`.
pub async fn drain_alerts(worker: JoinHandle<()>, limit: Duration) {
    if tokio::time::timeout(limit, worker).await.is_err() {
        warn!(timeout_secs = limit.as_secs(), "alert queue not drained before exit");
    }
}

fn open_store(config: &ScalerConfig) -> anyhow::Result<Option<Arc<dyn StatePersistence>>> {
    if !config.state.persist {
        info!("state persistence disabled");
        return Ok(None);
    }
    let path = &config.state.path;
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }
    let store = StateStore::open(path).with_context(|| format!("opening {}", path.display()))?;
    info!(path = %path.display(), "state store opened");
    Ok(Some(Arc::new(store)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn config(base_url: String, clusters: &[&str]) -> ScalerConfig {
        let mut config = ScalerConfig::default();
        config.api.base_url = base_url;
        config.api.project_id = "p1".to_string();
        config.api.token = Some("secret".to_string());
        config.state.persist = false;
        config.clusters = clusters.iter().map(|c| c.to_string()).collect();
        config
    }

    #[tokio::test]
    async fn rejected_credentials_fail_at_startup() {
        let base = serve(Router::new().route(
            "/groups/{project}/clusters",
            get(|| async { (StatusCode::UNAUTHORIZED, "bad token") }),
        ))
        .await;

        let err = Daemon::build(&config(base, &["orders"]), None)
            .await
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("connecting to the management API"));
    }

    #[tokio::test]
    async fn discovers_clusters_when_none_configured() {
        let base = serve(
            Router::new()
                .route(
                    "/groups/{project}/clusters",
                    get(|| async {
                        axum::Json(serde_json::json!({ "results": [{ "name": "orders" }] }))
                    }),
                )
                .route(
                    "/groups/{project}/clusters/{name}",
                    get(|| async {
                        axum::Json(serde_json::json!({
                            "name": "orders",
                            "stateName": "IDLE",
                            "providerSettings": { "instanceSizeName": "M20" }
                        }))
                    }),
                ),
        )
        .await;

        let daemon = Daemon::build(&config(base, &[]), None).await.unwrap();
        assert_eq!(daemon.controller.cluster_ids(), vec!["orders".to_string()]);
        daemon.finish().await;
    }
}
