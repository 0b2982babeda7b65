//! Sync server error types

use thiserror::Error;
use watchparty_core::SessionError;

/// Errors returned by [`crate::engine::EngineHandle`]
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine task has exited and no longer accepts commands
    #[error("Sync engine is not running")]
    Stopped,

    #[error(transparent)]
    Session(#[from] SessionError),
}
