//! Durable backend selection

use std::sync::Arc;
use watchparty_core::{
    DurableStore, MemoryStore, PersistErrorHook, SessionRepository, SqliteStore, StorageError,
};

use crate::config::{StorageBackend, StorageConfig};
use crate::metrics::Metrics;

/// Open the configured backend and wrap it in a repository whose failed
/// background writes are counted in `metrics`.
///
/// Spawns the repository's persistence writer, so call it from a runtime.
pub fn open_repository(
    config: &StorageConfig,
    metrics: Arc<Metrics>,
) -> Result<SessionRepository, StorageError> {
    let durable: Arc<dyn DurableStore> = match config.backend {
        StorageBackend::Sqlite => {
            tracing::info!(path = %config.sqlite_path.display(), "Opening SQLite session store");
            Arc::new(SqliteStore::open(&config.sqlite_path)?)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory session store, sessions are lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    let hook: PersistErrorHook = Arc::new(move |_session, _error| metrics.persistence_failed());
    Ok(SessionRepository::with_persist_error_hook(durable, Some(hook)))
}
