//! Integration tests for the orr-server HTTP API
//!
//! Uses tower::ServiceExt::oneshot to test routes directly without binding a port.
//! The demo session is built once per test into a scratch data root.

use axum::body::Body;
use http_body_util::BodyExt;
use hyper::Request;
use orr_ingest::fixture::DEMO_SESSION_KEY;
use orr_ingest::{BuildConfig, FixtureProvider, SessionBuilder, SessionStore};
use orr_server::{api::create_router, config::ServerConfig, state::AppState};
use std::path::PathBuf;
use tower::ServiceExt;

/// Helper: build the demo session under a fresh data root
async fn data_root(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("orr-api-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&root);

    let config = BuildConfig {
        session_key: DEMO_SESSION_KEY,
        output_root: root.clone(),
        ..BuildConfig::default()
    };
    let store = SessionStore::create(config.session_dir(), false).unwrap();
    SessionBuilder::new(&FixtureProvider::demo(), &config)
        .build(&store)
        .await
        .unwrap();
    root
}

/// Helper: build a router serving `root`
fn app(root: PathBuf) -> axum::Router {
    let config = ServerConfig {
        data_root: root,
        ..ServerConfig::default()
    };
    create_router(AppState::new(config))
}

/// Helper: collect response body into bytes
async fn body_bytes(body: Body) -> Vec<u8> {
    let collected = body.collect().await.unwrap();
    collected.to_bytes().to_vec()
}

/// Helper: collect response body into string
async fn body_string(body: Body) -> String {
    String::from_utf8(body_bytes(body).await).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

// ==================== GET /session/:key/:artifact ====================

#[tokio::test]
async fn test_artifact_is_returned_verbatim() {
    let root = data_root("verbatim").await;
    let on_disk = std::fs::read(root.join("race_data_1").join("race_metadata.json")).unwrap();

    let response = app(root).oneshot(get("/session/1/race_metadata")).await.unwrap();

    assert_eq!(response.status(), 200);
    let content_type = response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(content_type, "application/json");
    assert_eq!(body_bytes(response.into_body()).await, on_disk);
}

#[tokio::test]
async fn test_raw_collection_artifact() {
    let root = data_root("raw").await;
    let response = app(root).oneshot(get("/session/1/laps")).await.unwrap();

    assert_eq!(response.status(), 200);
    let laps: serde_json::Value = serde_json::from_str(&body_string(response.into_body()).await).unwrap();
    assert!(laps.as_array().is_some_and(|laps| !laps.is_empty()));
}

#[tokio::test]
async fn test_track_geometry_artifact() {
    let root = data_root("geometry").await;
    let response = app(root).oneshot(get("/session/1/track_geometry")).await.unwrap();

    assert_eq!(response.status(), 200);
    let geometry: serde_json::Value =
        serde_json::from_str(&body_string(response.into_body()).await).unwrap();
    assert!(geometry["racing_line"].as_array().is_some_and(|line| !line.is_empty()));
    assert!(geometry["bounds"].is_object());
}

#[tokio::test]
async fn test_unknown_artifact_returns_404() {
    let root = data_root("unknown-artifact").await;
    let router = app(root);

    let response = router.clone().oneshot(get("/session/1/nope")).await.unwrap();
    assert_eq!(response.status(), 404);

    let response = router.oneshot(get("/session/999/race_metadata")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_artifact_names_cannot_escape_session_dir() {
    let root = data_root("escape").await;
    std::fs::write(root.join("secret.json"), "{}").unwrap();

    let response = app(root)
        .oneshot(get("/session/1/..%2F..%2Fsecret"))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

// ==================== GET /api/sessions/:key/summary ====================

#[tokio::test]
async fn test_summary_lists_built_competitors() {
    let root = data_root("summary").await;
    let response = app(root).oneshot(get("/api/sessions/1/summary")).await.unwrap();

    assert_eq!(response.status(), 200);
    let summary: serde_json::Value =
        serde_json::from_str(&body_string(response.into_body()).await).unwrap();
    assert_eq!(summary["session_key"], "1");
    assert_eq!(summary["frame_step_ms"], 100);

    let drivers: Vec<u64> = summary["competitors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["driver_number"].as_u64().unwrap())
        .collect();
    assert_eq!(drivers, vec![1, 16, 44]);

    let max_offset = summary["max_offset_ms"].as_i64().unwrap();
    assert!(summary["competitors"]
        .as_array()
        .unwrap()
        .iter()
        .all(|c| c["max_offset_ms"].as_i64().unwrap() <= max_offset));
}

#[tokio::test]
async fn test_summary_of_missing_session_returns_404() {
    let root = data_root("summary-missing").await;
    let response = app(root).oneshot(get("/api/sessions/42/summary")).await.unwrap();
    assert_eq!(response.status(), 404);
}

// ==================== GET /ws/:key ====================

#[tokio::test]
async fn test_ws_unknown_session_returns_404() {
    let root = data_root("ws-unknown").await;
    let response = app(root).oneshot(get("/ws/42")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_ws_known_session_requires_upgrade() {
    let root = data_root("ws-plain").await;
    let response = app(root).oneshot(get("/ws/1")).await.unwrap();

    // The session exists, so the refusal comes from the missing upgrade headers
    assert_ne!(response.status(), 404);
    assert!(response.status().is_client_error());
}
