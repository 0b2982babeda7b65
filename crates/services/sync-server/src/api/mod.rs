//! HTTP API for the WatchParty sync server
//!
//! - `POST /api/sessions` - Create a session (legacy alias `/api/createSession`)
//! - `GET /api/sessions/:id` - Current session record (legacy alias `/api/session/:id`)
//! - `GET /ws` - Sync WebSocket
//! - `GET /health`, `GET /metrics`
//! - Static web client when `server.static_dir` is set

pub mod sessions;

use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::engine::EngineHandle;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::ws;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub config: Arc<Config>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(engine: EngineHandle, config: Arc<Config>, metrics: Arc<Metrics>) -> Self {
        Self {
            engine,
            config,
            metrics,
        }
    }
}

/// Build the HTTP router
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/api/sessions", post(sessions::create_session))
        .route("/api/createSession", post(sessions::create_session))
        .route("/api/sessions/:id", get(sessions::get_session))
        .route("/api/session/:id", get(sessions::get_session))
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler));

    let router = match &state.config.server.static_dir {
        Some(dir) => router.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(Path::new(dir).join("index.html"))),
        ),
        None => router,
    };

    router
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Metrics endpoint
async fn metrics_handler(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}
