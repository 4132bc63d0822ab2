use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use lineage_kernel::config::{CoordinationKind, StoreConfig};
use lineage_node::api::{HealthResponse, IngestResponse, StatusResponse};
use lineage_node::config::DEFAULT_BODY_LIMIT_BYTES;
use lineage_node::server::build_router;
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt; // for oneshot

fn app_for(cfg: &StoreConfig) -> Router {
    build_router(Arc::new(cfg.build().unwrap()), None, DEFAULT_BODY_LIMIT_BYTES)
}

fn store_in(dir: &std::path::Path) -> StoreConfig {
    StoreConfig {
        data_dir: dir.to_path_buf(),
        ..Default::default()
    }
}

fn post_json(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/v1/lineage")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn start_event(job: &str) -> Value {
    json!({
        "eventType": "START",
        "eventTime": "2024-05-01T10:00:00Z",
        "run": { "runId": "0a1b2c3d-0000-4000-8000-000000000001" },
        "job": { "namespace": "dev", "name": job },
        "inputs": [],
        "outputs": [],
        "producer": "https://github.com/OpenLineage/OpenLineage"
    })
}

#[tokio::test]
async fn test_ingest_stores_event_with_sequence() {
    let dir = tempdir().unwrap();
    let app = app_for(&store_in(dir.path()));

    let response = app.clone().oneshot(post_json(&start_event("a"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let first: IngestResponse = body_json(response).await;

    assert!(first.success);
    assert!(first.coordinated);
    assert_eq!(first.counter, Some(1));
    assert!(first.timestamp.is_none());
    assert!(first.filename.starts_with("001_lineage_data_"));
    assert!(first.filename.ends_with(".json"));
    assert_eq!(first.message, format!("Payload saved successfully to {}", first.filename));

    let stored: Value =
        serde_json::from_slice(&std::fs::read(dir.path().join(&first.filename)).unwrap()).unwrap();
    assert_eq!(stored, start_event("a"));

    let second: IngestResponse = body_json(app.oneshot(post_json(&start_event("b"))).await.unwrap()).await;
    assert_eq!(second.counter, Some(2));
    assert_ne!(first.event_id, second.event_id);
}

#[tokio::test]
async fn test_ingest_rejects_non_object_payloads() {
    let dir = tempdir().unwrap();
    let app = app_for(&store_in(dir.path()));

    let response = app.clone().oneshot(post_json(&json!([1, 2, 3]))).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = body_json(response).await;
    assert_eq!(body["error"], "Invalid payload");

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/v1/lineage")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    assert_eq!(app.clone().oneshot(malformed).await.unwrap().status(), StatusCode::BAD_REQUEST);

    // Nothing was allocated for the rejected requests.
    let ok: IngestResponse = body_json(app.oneshot(post_json(&json!({ "a": 1 }))).await.unwrap()).await;
    assert_eq!(ok.counter, Some(1));
}

#[tokio::test]
async fn test_ingest_requires_json_content_type() {
    let dir = tempdir().unwrap();
    let req = Request::builder()
        .method("POST")
        .uri("/api/v1/lineage")
        .header("content-type", "text/plain")
        .body(Body::from("{}"))
        .unwrap();
    let response = app_for(&store_in(dir.path())).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn test_ingest_only_accepts_post() {
    let dir = tempdir().unwrap();
    let req = Request::builder()
        .method("GET")
        .uri("/api/v1/lineage")
        .body(Body::empty())
        .unwrap();
    let response = app_for(&store_in(dir.path())).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_ingest_enforces_body_limit() {
    let dir = tempdir().unwrap();
    let app = build_router(Arc::new(store_in(dir.path()).build().unwrap()), None, 64);

    let big = json!({ "padding": "x".repeat(1024) });
    let response = app.oneshot(post_json(&big)).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn test_ingest_falls_back_when_counter_is_unavailable() {
    let dir = tempdir().unwrap();
    let cfg = StoreConfig {
        counter_path: Some(dir.path().join("missing").join("counter.txt")),
        lock_timeout_ms: 200,
        ..store_in(dir.path())
    };

    let response = app_for(&cfg).oneshot(post_json(&start_event("a"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: IngestResponse = body_json(response).await;
    assert!(!body.coordinated);
    assert!(body.counter.is_none());
    assert!(body.timestamp.is_some());
    assert!(dir.path().join(&body.filename).exists());
}

#[tokio::test]
async fn test_ingest_uncoordinated_mode() {
    let dir = tempdir().unwrap();
    let cfg = StoreConfig {
        coordination: CoordinationKind::None,
        ..store_in(dir.path())
    };
    let body: IngestResponse =
        body_json(app_for(&cfg).oneshot(post_json(&json!({ "a": 1 }))).await.unwrap()).await;
    assert!(!body.coordinated);
}

#[tokio::test]
async fn test_ingest_refuses_corrupted_counter() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("counter.txt"), "oops").unwrap();
    let app = app_for(&store_in(dir.path()));

    let response = app.oneshot(post_json(&start_event("a"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(std::fs::read_to_string(dir.path().join("counter.txt")).unwrap(), "oops");
}

#[tokio::test]
async fn test_sink_failure_reports_event_id() {
    let dir = tempdir().unwrap();
    let blocker = dir.path().join("events");
    std::fs::write(&blocker, "not a directory").unwrap();
    let cfg = StoreConfig {
        counter_path: Some(dir.path().join("counter.txt")),
        ..store_in(&blocker)
    };

    let response = app_for(&cfg).oneshot(post_json(&start_event("a"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = body_json(response).await;
    assert!(body["eventId"].as_str().unwrap().starts_with("001_lineage_data_"));
}

#[tokio::test]
async fn test_health() {
    let dir = tempdir().unwrap();
    let app = app_for(&store_in(dir.path()));

    let get = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(get).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: HealthResponse = body_json(response).await;
    assert_eq!(body.status, "ok");
    assert_eq!(body.service, "openlineage-proxy");

    let head = Request::builder()
        .method("HEAD")
        .uri("/api/health")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(head).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    assert!(bytes.is_empty());
}

#[tokio::test]
async fn test_status_reports_statistics() {
    let dir = tempdir().unwrap();
    let app = app_for(&store_in(dir.path()));
    for job in ["a", "b"] {
        app.clone().oneshot(post_json(&start_event(job))).await.unwrap();
    }

    let req = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
    let response = app.oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: StatusResponse = body_json(response).await;
    assert_eq!(body.status, "healthy");
    assert_eq!(body.statistics.total_events_received, 2);
    assert_eq!(body.statistics.events_stored, 2);
    assert_eq!(body.statistics.storage_backend, "filesystem");
    assert_eq!(body.statistics.coordination, "lock-file");
    assert_eq!(body.endpoints.lineage, "/api/v1/lineage");
}

#[tokio::test]
async fn test_status_fails_on_unreadable_counter() {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("counter.txt"), "oops").unwrap();

    let req = Request::builder().uri("/api/status").body(Body::empty()).unwrap();
    let response = app_for(&store_in(dir.path())).oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = body_json(response).await;
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_auth_guard() {
    let dir = tempdir().unwrap();
    let app = build_router(
        Arc::new(store_in(dir.path()).build().unwrap()),
        Some("secret".to_string()),
        DEFAULT_BODY_LIMIT_BYTES,
    );

    let response = app.clone().oneshot(post_json(&json!({ "a": 1 }))).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut req = post_json(&json!({ "a": 1 }));
    req.headers_mut()
        .insert("authorization", "Bearer secret".parse().unwrap());
    assert_eq!(app.oneshot(req).await.unwrap().status(), StatusCode::OK);
}
