//! REST API regression tests over a running controller.
//!
//! The router, controller loop, alert dispatcher, and redb store are the
//! production types; only the managed-database API is faked.

mod common;

use std::sync::Arc;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tokio::sync::watch;
use tower::ServiceExt;

use dbscale_api::build_router;
use dbscale_core::ScalerConfig;
use dbscale_engine::ManualClock;
use dbscale_state::StateStore;

use common::{EPOCH, FakeAtlas, stack};

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let (status, body) = send(app, req).await;
    (status, serde_json::from_str(&body).unwrap())
}

async fn post(app: &Router, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder().method("POST").uri(uri);
    let req = match body {
        Some(json) => req
            .header("content-type", "application/json")
            .body(Body::from(json.to_string())),
        None => req.body(Body::empty()),
    }
    .unwrap();
    let (status, body) = send(app, req).await;
    (status, serde_json::from_str(&body).unwrap())
}

#[tokio::test]
async fn operator_commands_through_the_api() {
    let store = Arc::new(StateStore::open_in_memory().unwrap());
    let atlas = FakeAtlas::with_clusters(&[("orders", "M10"), ("billing", "M30")]);
    let s = stack(
        &ScalerConfig::default(),
        atlas.clone(),
        Some(store.clone()),
        ManualClock::new(EPOCH),
        &["billing", "orders"],
    )
    .await;

    let app = build_router(s.controller.handle());
    let (shutdown, rx) = watch::channel(false);
    let control_loop = tokio::spawn(s.controller.run(rx));

    let (status, body) = get(&app, "/api/v1/clusters").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);

    let (status, body) = post(
        &app,
        "/api/v1/clusters/orders/scale",
        Some(json!({ "target_size": "M40" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["from_size"], "M10");
    assert_eq!(body["data"]["to_size"], "M40");
    assert_eq!(atlas.size_of("orders").as_deref(), Some("M40"));

    let (status, body) = post(&app, "/api/v1/clusters/orders/disable", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["enabled"], false);

    let (_, body) = get(&app, "/api/v1/clusters/orders?limit=5").await;
    let cluster = &body["data"];
    assert_eq!(cluster["current_size"], "M40");
    assert_eq!(cluster["enabled"], false);
    assert_eq!(cluster["scale_ups_last_hour"], 1);
    assert_eq!(cluster["recent_events"][0]["forced"], true);

    let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let (status, text) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("dbscale_cluster_info{cluster=\"orders\",size=\"M40\"} 1"));
    assert!(text.contains("dbscale_scaling_enabled{cluster=\"orders\"} 0"));
    assert!(text.contains("dbscale_scaling_enabled{cluster=\"billing\"} 1"));

    shutdown.send(true).unwrap();
    control_loop.await.unwrap();

    let record = store.get_cluster("orders").unwrap().unwrap();
    assert_eq!(record.current_size, "M40");
    assert!(!record.enabled);
    assert_eq!(store.list_events_for_cluster("orders", 10).unwrap().len(), 1);

    s.alert_worker.await.unwrap();
    assert!(!s.alerts.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn rejected_operator_input() {
    let atlas = FakeAtlas::with_clusters(&[("orders", "M10")]);
    let s = stack(
        &ScalerConfig::default(),
        atlas.clone(),
        None,
        ManualClock::new(EPOCH),
        &["orders"],
    )
    .await;
    let app = build_router(s.controller.handle());
    let (_shutdown, rx) = watch::channel(false);
    tokio::spawn(s.controller.run(rx));

    // Above the configured ceiling.
    let (status, body) = post(
        &app,
        "/api/v1/clusters/orders/scale",
        Some(json!({ "target_size": "M200" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    let (status, _) = post(&app, "/api/v1/clusters/unknown/enable", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = get(&app, "/api/v1/clusters/unknown").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert!(atlas.resizes.lock().unwrap().is_empty());
}
