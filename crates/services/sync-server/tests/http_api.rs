//! HTTP bootstrap API tests

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use watchparty_core::{MemoryStore, SessionRepository, SystemClock};
use watchparty_sync_server::api::{build_router, AppState};
use watchparty_sync_server::config::Config;
use watchparty_sync_server::engine::SyncEngine;
use watchparty_sync_server::metrics::Metrics;

fn app_with_store(store: Arc<MemoryStore>) -> Router {
    let metrics = Arc::new(Metrics::new());
    let repository = SessionRepository::new(store);
    let (engine, _task) =
        SyncEngine::new(repository, Arc::new(SystemClock), metrics.clone()).spawn(16);
    build_router(AppState::new(engine, Arc::new(Config::default()), metrics))
}

fn app() -> Router {
    app_with_store(Arc::new(MemoryStore::new()))
}

async fn call(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_create_then_get_session() {
    let app = app();

    let (status, body) = call(
        &app,
        post_json(
            "/api/sessions",
            json!({"sessionId": "movie", "videoSource": "https://youtu.be/abc"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["session"]["sessionId"], "movie");
    assert_eq!(body["session"]["timestamp"], 0.0);
    assert_eq!(body["session"]["isPlaying"], false);

    let (status, body) = call(&app, get("/api/sessions/movie")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["videoSource"], "https://youtu.be/abc");
}

#[tokio::test]
async fn test_legacy_routes_and_fields() {
    let app = app();

    let (status, _) = call(
        &app,
        post_json(
            "/api/createSession",
            json!({"sessionId": "old", "youtubeVidUrl": "https://youtu.be/old"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = call(&app, get("/api/session/old")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["videoSource"], "https://youtu.be/old");
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let app = app();
    let request = || {
        post_json(
            "/api/sessions",
            json!({"sessionId": "movie", "videoSource": "https://youtu.be/abc"}),
        )
    };

    call(&app, request()).await;
    let (status, body) = call(&app, request()).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "session_exists");
}

#[tokio::test]
async fn test_empty_fields_rejected() {
    let app = app();

    let (status, body) = call(&app, post_json("/api/sessions", json!({"sessionId": "  "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "invalid_session");
}

#[tokio::test]
async fn test_durable_failure_is_server_error() {
    let store = Arc::new(MemoryStore::new());
    store.set_fail_writes(true);
    let app = app_with_store(store.clone());

    let (status, body) = call(
        &app,
        post_json(
            "/api/sessions",
            json!({"sessionId": "movie", "videoSource": "https://youtu.be/abc"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["success"], false);

    let (status, _) = call(&app, get("/api/sessions/movie")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unknown_session_is_not_found() {
    let app = app();

    let (status, body) = call(&app, get("/api/sessions/ghost")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "session_not_found");
}

#[tokio::test]
async fn test_health_and_metrics() {
    let app = app();

    let response = app.clone().oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"OK");

    call(
        &app,
        post_json(
            "/api/sessions",
            json!({"sessionId": "movie", "videoSource": "https://youtu.be/abc"}),
        ),
    )
    .await;
    let (status, body) = call(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["sessions_created"], 1);
}
