//! Error types for WatchParty core

use thiserror::Error;

/// Errors raised by the session repository
#[derive(Debug, Error)]
pub enum SessionError {
    /// No record exists for the session identifier
    #[error("Session not found: {0}")]
    NotFound(String),

    /// A record already exists for the session identifier
    #[error("Session already exists: {0}")]
    AlreadyExists(String),

    /// The action needs a playhead timestamp and none (or an invalid one) was given
    #[error("Action {action} requires a finite, non-negative timestamp")]
    MissingTimestamp {
        /// Wire name of the offending action
        action: &'static str,
    },

    /// Session identifier or video source is unusable
    #[error("Invalid session: {0}")]
    InvalidSession(String),

    /// Durable store failure surfaced synchronously (create / cold read)
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SessionError {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "session_not_found",
            Self::AlreadyExists(_) => "session_exists",
            Self::MissingTimestamp { .. } => "missing_timestamp",
            Self::InvalidSession(_) => "invalid_session",
            Self::Storage(_) => "storage_error",
        }
    }
}

/// Durable store errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite driver error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored row could not be decoded into a session
    #[error("Corrupt session record for {session_id}: {reason}")]
    Corrupt {
        /// Session whose row is unreadable
        session_id: String,
        /// What was wrong with it
        reason: String,
    },

    /// The blocking storage task panicked or was cancelled
    #[error("Storage task failed: {0}")]
    Task(String),

    /// Backend refused the operation (used by in-memory failure injection)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Wire protocol errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound text was not a valid client message
    #[error("Malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Message parsed but the session identifier is empty
    #[error("Message has an empty sessionId")]
    EmptySessionId,
}

/// Client synchronizer errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClientSyncError {
    /// `join` called after the viewer already joined
    #[error("Already joined session {0}")]
    AlreadyJoined(String),
}
