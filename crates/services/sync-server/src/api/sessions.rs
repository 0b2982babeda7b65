//! Session bootstrap endpoints
//!
//! Creating and reading sessions goes through the engine queue, so these
//! handlers observe the same state the WebSocket protocol mutates.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use watchparty_core::{SessionError, WatchPartySession};

use super::AppState;
use crate::error::EngineError;

/// Request body for creating a session
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    #[serde(default)]
    pub session_id: String,

    /// Video reference (`youtubeVidUrl` accepted from older clients)
    #[serde(default, alias = "youtubeVidUrl")]
    pub video_source: String,
}

/// Response body for session creation
#[derive(Debug, Serialize)]
pub struct CreateSessionResponse {
    pub success: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<WatchPartySession>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Create a new session, paused at position zero
///
/// POST /api/sessions
pub async fn create_session(
    State(state): State<AppState>,
    Json(req): Json<CreateSessionRequest>,
) -> impl IntoResponse {
    match state
        .engine
        .create_session(req.session_id.trim(), req.video_source.trim())
        .await
    {
        Ok(session) => (
            StatusCode::CREATED,
            Json(CreateSessionResponse {
                success: true,
                session: Some(session),
                error: None,
                message: None,
            }),
        )
            .into_response(),
        Err(e) => {
            let (status, code) = error_status(&e);
            if status.is_server_error() {
                tracing::error!(
                    session_id = %req.session_id,
                    error = %e,
                    "Failed to create session"
                );
            }
            (
                status,
                Json(CreateSessionResponse {
                    success: false,
                    session: None,
                    error: Some(code.to_string()),
                    message: Some(e.to_string()),
                }),
            )
                .into_response()
        }
    }
}

/// Get the current session record
///
/// GET /api/sessions/:id
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    match state.engine.get_session(&session_id).await {
        Ok(session) => (StatusCode::OK, Json(session)).into_response(),
        Err(e) => {
            let (status, code) = error_status(&e);
            (
                status,
                Json(ErrorResponse {
                    error: code.to_string(),
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn error_status(err: &EngineError) -> (StatusCode, &'static str) {
    match err {
        EngineError::Stopped => (StatusCode::SERVICE_UNAVAILABLE, "engine_stopped"),
        EngineError::Session(e) => {
            let status = match e {
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::AlreadyExists(_) => StatusCode::CONFLICT,
                SessionError::InvalidSession(_) | SessionError::MissingTimestamp { .. } => {
                    StatusCode::BAD_REQUEST
                }
                SessionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, e.code())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use watchparty_core::StorageError;

    #[test]
    fn test_create_request_accepts_legacy_field() {
        let req: CreateSessionRequest =
            serde_json::from_str(r#"{"sessionId":"abc","youtubeVidUrl":"https://youtu.be/x"}"#)
                .unwrap();
        assert_eq!(req.session_id, "abc");
        assert_eq!(req.video_source, "https://youtu.be/x");

        let req: CreateSessionRequest = serde_json::from_str("{}").unwrap();
        assert!(req.session_id.is_empty());
    }

    #[test]
    fn test_error_status_mapping() {
        let status = |e: SessionError| error_status(&EngineError::Session(e)).0;

        assert_eq!(status(SessionError::NotFound("a".into())), StatusCode::NOT_FOUND);
        assert_eq!(status(SessionError::AlreadyExists("a".into())), StatusCode::CONFLICT);
        assert_eq!(status(SessionError::InvalidSession("a".into())), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(SessionError::Storage(StorageError::Unavailable("down".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            error_status(&EngineError::Stopped).0,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
