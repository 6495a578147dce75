//! dbscale-api — REST API for the autoscaler.
//!
//! Handlers talk to the controller only through a `ControllerHandle`, so
//! every request is applied between ticks and never races a running
//! pipeline.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/clusters` | Status of every monitored cluster |
//! | GET | `/api/v1/clusters/:id?limit=N` | Status of one cluster |
//! | POST | `/api/v1/clusters/:id/enable` | Resume automatic scaling |
//! | POST | `/api/v1/clusters/:id/disable` | Pause automatic scaling |
//! | POST | `/api/v1/clusters/:id/scale` | Forced resize to `target_size` |
//! | POST | `/api/v1/clusters/:id/check` | Evaluate one cluster now |
//! | POST | `/api/v1/check` | Evaluate every cluster now |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use axum::Router;
use axum::routing::{get, post};
use dbscale_engine::ControllerHandle;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub handle: ControllerHandle,
}

/// Build the complete API router (REST + metrics).
pub fn build_router(handle: ControllerHandle) -> Router {
    let api_state = ApiState { handle };

    let api_routes = Router::new()
        .route("/clusters", get(handlers::list_clusters))
        .route("/clusters/{id}", get(handlers::get_cluster))
        .route("/clusters/{id}/enable", post(handlers::enable_cluster))
        .route("/clusters/{id}/disable", post(handlers::disable_cluster))
        .route("/clusters/{id}/scale", post(handlers::scale_cluster))
        .route("/clusters/{id}/check", post(handlers::check_cluster))
        .route("/check", post(handlers::check_all))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use tokio::sync::watch;

    use dbscale_core::config::ScalerConfig;
    use dbscale_core::ports::{
        ClusterControl, CollectError, MetricReading, MetricsSource, NullAlertSink, ResizeAck,
        ResizeError,
    };
    use dbscale_engine::{Collaborators, Controller, ManualClock};

    use crate::ApiState;

    /// Every cluster sits between its thresholds, so the background tick
    /// never resizes anything.
    pub struct SteadyMetrics;

    #[async_trait]
    impl MetricsSource for SteadyMetrics {
        async fn fetch(&self, _id: &str, names: &[String]) -> Result<MetricReading, CollectError> {
            let values: BTreeMap<String, f64> = names
                .iter()
                .map(|n| {
                    let value = match n.as_str() {
                        "connections" | "iops" => 500.0,
                        _ => 60.0,
                    };
                    (n.clone(), value)
                })
                .collect();
            Ok(MetricReading {
                timestamp: 1_700_000_000,
                values,
            })
        }
    }

    #[derive(Default)]
    pub struct Sizes {
        pub sizes: Mutex<BTreeMap<String, String>>,
    }

    #[async_trait]
    impl ClusterControl for Sizes {
        async fn current_size(&self, id: &str) -> Result<String, ResizeError> {
            Ok(self
                .sizes
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .unwrap_or_else(|| "M10".to_string()))
        }

        async fn resize(&self, id: &str, target: &str) -> Result<ResizeAck, ResizeError> {
            self.sizes
                .lock()
                .unwrap()
                .insert(id.to_string(), target.to_string());
            Ok(ResizeAck::Accepted)
        }
    }

    async fn controller(clusters: &[&str]) -> Controller {
        let mut config = ScalerConfig::default();
        // Keep the periodic loop out of the way; tests drive checks explicitly.
        config.monitoring.check_interval = 3600;
        let deps = Collaborators {
            metrics: Arc::new(SteadyMetrics),
            control: Arc::new(Sizes::default()),
            alerts: Arc::new(NullAlertSink),
            store: None,
            clock: Arc::new(ManualClock::new(1_700_000_000)),
        };
        let mut controller = Controller::new(&config, deps).unwrap();
        for id in clusters {
            controller.add_cluster(id).await.unwrap();
        }
        controller
    }

    /// A running controller; dropping the sender leaves it running until
    /// the runtime shuts down.
    pub async fn harness(clusters: &[&str]) -> (ApiState, watch::Sender<bool>) {
        let controller = controller(clusters).await;
        let handle = controller.handle();
        let (shutdown, rx) = watch::channel(false);
        tokio::spawn(controller.run(rx));
        (ApiState { handle }, shutdown)
    }

    /// A handle whose controller is gone.
    pub async fn stopped_state() -> ApiState {
        let controller = controller(&[]).await;
        ApiState {
            handle: controller.handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                request = request.header("content-type", "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.clone().oneshot(request.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn cluster_listing_and_detail() {
        let (state, _shutdown) = testing::harness(&["billing", "orders"]).await;
        let app = build_router(state.handle);

        let (status, body) = call(&app, "GET", "/api/v1/clusters", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"].as_array().unwrap().len(), 2);

        let (status, body) = call(&app, "GET", "/api/v1/clusters/orders?limit=1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["cluster_id"], "orders");
        assert_eq!(body["data"]["current_size"], "M10");
    }

    #[tokio::test]
    async fn check_reports_steady_cluster() {
        let (state, _shutdown) = testing::harness(&["orders"]).await;
        let app = build_router(state.handle);

        let (status, body) = call(&app, "POST", "/api/v1/clusters/orders/check", None).await;
        assert_eq!(status, StatusCode::OK);
        let report = &body["data"][0];
        assert_eq!(report["signal"], "normal");
        assert_eq!(report["reason"], "steady");
        assert_eq!(report["current_size"], "M10");
        assert!(report["event"].is_null());
        assert_eq!(report["values"]["cpu"], 60.0);
    }

    #[tokio::test]
    async fn disable_blocks_automatic_scaling() {
        let (state, _shutdown) = testing::harness(&["orders"]).await;
        let app = build_router(state.handle);

        let (status, body) = call(&app, "POST", "/api/v1/clusters/orders/disable", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["enabled"], false);

        let (_, body) = call(&app, "POST", "/api/v1/check", None).await;
        assert_eq!(body["data"][0]["reason"], "disabled");
        assert_eq!(body["data"][0]["current_size"], "M10");

        let (_, body) = call(&app, "POST", "/api/v1/clusters/orders/enable", None).await;
        assert_eq!(body["data"]["enabled"], true);
    }

    #[tokio::test]
    async fn forced_scale_via_api() {
        let (state, _shutdown) = testing::harness(&["orders"]).await;
        let app = build_router(state.handle);

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/clusters/orders/scale",
            Some(serde_json::json!({ "target_size": "M40" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["forced"], true);
        assert_eq!(body["data"]["to_size"], "M40");

        let (status, body) = call(
            &app,
            "POST",
            "/api/v1/clusters/orders/scale",
            Some(serde_json::json!({ "target_size": "M200" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn unknown_cluster_routes_404() {
        let (state, _shutdown) = testing::harness(&["orders"]).await;
        let app = build_router(state.handle);

        let (status, _) = call(&app, "POST", "/api/v1/clusters/ghost/check", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn metrics_exposition() {
        let (state, _shutdown) = testing::harness(&["orders"]).await;
        let app = build_router(state.handle);

        let resp = app
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let text = String::from_utf8(
            to_bytes(resp.into_body(), usize::MAX).await.unwrap().to_vec(),
        )
        .unwrap();
        assert!(text.contains("dbscale_scaling_enabled{cluster=\"orders\"} 1"));
    }
}
