//! JSON wire protocol between viewers and the sync server
//!
//! Client → server:
//!
//! ```json
//! { "action": "PLAY", "sessionId": "abc", "timestamp": 42.0, "handle": "..." }
//! ```
//!
//! Server → client is one of a state message (`{action, handle, session}`),
//! an end notice (`{action: "END", sessionId}`) or an error notice
//! (`{error, message, action?, sessionId?}`).

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::handle::ClientHandle;
use crate::session::WatchPartySession;

/// Playback actions exchanged over the socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    #[serde(alias = "INITIALIZE")]
    Join,
    Play,
    Pause,
    Seek,
    #[serde(alias = "BUFFER")]
    BufferStart,
    BufferEnd,
    End,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Join => "JOIN",
            Self::Play => "PLAY",
            Self::Pause => "PAUSE",
            Self::Seek => "SEEK",
            Self::BufferStart => "BUFFER_START",
            Self::BufferEnd => "BUFFER_END",
            Self::End => "END",
        }
    }

    /// Whether the action carries the sender's playhead and rewrites it into the record
    pub fn carries_position(&self) -> bool {
        matches!(
            self,
            Self::Play | Self::Pause | Self::Seek | Self::BufferStart
        )
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message sent by a viewer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientMessage {
    pub action: Action,

    #[serde(default)]
    pub session_id: String,

    /// Locally observed playhead in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,

    /// Sender's handle (absent before the join reply arrives)
    #[serde(default, alias = "clientId", skip_serializing_if = "Option::is_none")]
    pub handle: Option<ClientHandle>,
}

impl ClientMessage {
    pub fn new(action: Action, session_id: impl Into<String>) -> Self {
        Self {
            action,
            session_id: session_id.into(),
            timestamp: None,
            handle: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_handle(mut self, handle: Option<ClientHandle>) -> Self {
        self.handle = handle;
        self
    }

    /// Decode and validate an inbound text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let message: ClientMessage = serde_json::from_str(text)?;
        if message.session_id.trim().is_empty() {
            return Err(ProtocolError::EmptySessionId);
        }
        Ok(message)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Authoritative state delivered as a join reply or a broadcast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub action: Action,
    /// For a join reply, the handle issued to the recipient; for broadcasts,
    /// the originator's handle.
    pub handle: ClientHandle,
    pub session: WatchPartySession,
}

/// Session-ended notice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndNotice {
    pub action: Action,
    pub session_id: String,
}

/// Error reply sent only to the requesting connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    /// Machine-readable code, e.g. `session_not_found`
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<Action>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Any server → client message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Sync(SyncMessage),
    Error(ErrorNotice),
    End(EndNotice),
}

impl ServerMessage {
    pub fn sync(action: Action, handle: ClientHandle, session: WatchPartySession) -> Self {
        Self::Sync(SyncMessage {
            action,
            handle,
            session,
        })
    }

    pub fn end(session_id: impl Into<String>) -> Self {
        Self::End(EndNotice {
            action: Action::End,
            session_id: session_id.into(),
        })
    }

    pub fn error(
        error: impl Into<String>,
        message: impl Into<String>,
        action: Option<Action>,
        session_id: Option<String>,
    ) -> Self {
        Self::Error(ErrorNotice {
            error: error.into(),
            message: message.into(),
            action,
            session_id,
        })
    }

    /// Session the message refers to, if any
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::Sync(m) => Some(&m.session.session_id),
            Self::End(m) => Some(&m.session_id),
            Self::Error(m) => m.session_id.as_deref(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_play_message() {
        let msg = ClientMessage::parse(
            r#"{"action":"PLAY","sessionId":"abc","timestamp":42.5,"handle":"h1"}"#,
        )
        .unwrap();
        assert_eq!(msg.action, Action::Play);
        assert_eq!(msg.session_id, "abc");
        assert_eq!(msg.timestamp, Some(42.5));
        assert_eq!(msg.handle, Some(ClientHandle::from("h1")));
    }

    #[test]
    fn test_parse_legacy_names() {
        let msg =
            ClientMessage::parse(r#"{"action":"INITIALIZE","sessionId":"abc","timestamp":null}"#)
                .unwrap();
        assert_eq!(msg.action, Action::Join);
        assert_eq!(msg.timestamp, None);

        let msg = ClientMessage::parse(
            r#"{"action":"BUFFER","sessionId":"abc","timestamp":3,"clientId":"old"}"#,
        )
        .unwrap();
        assert_eq!(msg.action, Action::BufferStart);
        assert_eq!(msg.handle, Some(ClientHandle::from("old")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            ClientMessage::parse("not json"),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"action":"DANCE","sessionId":"abc"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(
            ClientMessage::parse(r#"{"action":"END"}"#),
            Err(ProtocolError::EmptySessionId)
        ));
    }

    #[test]
    fn test_client_message_omits_absent_fields() {
        let json = ClientMessage::new(Action::Join, "abc").to_json().unwrap();
        assert_eq!(json, r#"{"action":"JOIN","sessionId":"abc"}"#);
    }

    #[test]
    fn test_server_message_variants_decode() {
        let session = WatchPartySession::new(
            "abc",
            "https://example.com/v",
            Utc.timestamp_millis_opt(1_700_000_000_000).unwrap(),
        );
        let sync = ServerMessage::sync(Action::Play, ClientHandle::from("h"), session);
        let decoded = ServerMessage::parse(&sync.to_json().unwrap()).unwrap();
        assert_eq!(decoded, sync);
        assert_eq!(decoded.session_id(), Some("abc"));

        let end = ServerMessage::end("abc");
        let json = end.to_json().unwrap();
        assert_eq!(json, r#"{"action":"END","sessionId":"abc"}"#);
        assert!(matches!(ServerMessage::parse(&json).unwrap(), ServerMessage::End(_)));

        let err = ServerMessage::error(
            "session_not_found",
            "Session nope not found",
            Some(Action::Join),
            Some("nope".to_string()),
        );
        assert!(matches!(
            ServerMessage::parse(&err.to_json().unwrap()).unwrap(),
            ServerMessage::Error(ErrorNotice { ref error, .. }) if error == "session_not_found"
        ));
    }
}
