//! Session repository
//!
//! [`SessionRepository`] is the single source of truth for playback records
//! inside one process. Reads are served from an in-memory cache that is
//! filled from a [`DurableStore`] on first access; every state-changing
//! transition is written through to the durable store on a background
//! writer task, so a slow or failing backend never delays the caller.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use crate::error::{SessionError, StorageError};
use crate::protocol::Action;
use crate::session::WatchPartySession;

/// Read/write contract of the durable backing store
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Fetch a record by session identifier
    async fn load(&self, session_id: &str) -> Result<Option<WatchPartySession>, StorageError>;

    /// Insert a new record; `Ok(false)` when the identifier is taken
    async fn insert(&self, session: &WatchPartySession) -> Result<bool, StorageError>;

    /// Insert or overwrite a record
    async fn save(&self, session: &WatchPartySession) -> Result<(), StorageError>;
}

/// Callback invoked when a background write fails
pub type PersistErrorHook = Arc<dyn Fn(&WatchPartySession, &StorageError) + Send + Sync>;

enum PersistCommand {
    Save(WatchPartySession),
    Flush(oneshot::Sender<()>),
}

/// Write-through cache of session records
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use chrono::Utc;
/// use watchparty_core::{Action, MemoryStore, SessionRepository};
///
/// # tokio_test::block_on(async {
/// let mut repo = SessionRepository::new(Arc::new(MemoryStore::new()));
/// repo.create("movie-night", "https://youtu.be/dQw4w9WgXcQ", Utc::now()).await?;
///
/// let session = repo.apply("movie-night", Action::Play, Some(12.0), Utc::now()).await?;
/// assert!(session.is_playing);
/// # Ok::<(), watchparty_core::SessionError>(())
/// # }).unwrap();
/// ```
pub struct SessionRepository {
    cache: HashMap<String, WatchPartySession>,
    durable: Arc<dyn DurableStore>,
    persist_tx: mpsc::UnboundedSender<PersistCommand>,
}

impl SessionRepository {
    /// Create a repository over `durable`.
    ///
    /// Must be called inside a tokio runtime: the persistence writer task is
    /// spawned here.
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self::with_persist_error_hook(durable, None)
    }

    /// Like [`SessionRepository::new`], with a hook observing failed writes
    pub fn with_persist_error_hook(
        durable: Arc<dyn DurableStore>,
        hook: Option<PersistErrorHook>,
    ) -> Self {
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        // The writer drains whatever is queued and exits once the repository is dropped.
        tokio::spawn(run_persist_writer(durable.clone(), persist_rx, hook));

        Self {
            cache: HashMap::new(),
            durable,
            persist_tx,
        }
    }

    /// Create a new paused session at position zero.
    ///
    /// The durable insert is awaited; if it fails the record is not cached.
    pub async fn create(
        &mut self,
        session_id: &str,
        video_source: &str,
        now: DateTime<Utc>,
    ) -> Result<WatchPartySession, SessionError> {
        if session_id.trim().is_empty() {
            return Err(SessionError::InvalidSession("sessionId is empty".to_string()));
        }
        if video_source.trim().is_empty() {
            return Err(SessionError::InvalidSession("videoSource is empty".to_string()));
        }
        if self.cache.contains_key(session_id) {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }

        let session = WatchPartySession::new(session_id, video_source, now);
        if !self.durable.insert(&session).await? {
            return Err(SessionError::AlreadyExists(session_id.to_string()));
        }

        tracing::info!(
            session_id = %session.session_id,
            video_source = %session.video_source,
            "Created watch party session"
        );
        self.cache.insert(session.session_id.clone(), session.clone());
        Ok(session)
    }

    /// Current record for `session_id`, reading through to the durable store
    /// on a cache miss.
    pub async fn get(&mut self, session_id: &str) -> Result<WatchPartySession, SessionError> {
        Ok(self.load_cached(session_id).await?.clone())
    }

    /// Apply `action` to the session and write the result through.
    ///
    /// Unknown sessions fail with [`SessionError::NotFound`]; invalid
    /// payloads leave the record untouched.
    pub async fn apply(
        &mut self,
        session_id: &str,
        action: Action,
        timestamp: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<WatchPartySession, SessionError> {
        let session = self.load_cached(session_id).await?;
        let changed = session.apply(action, timestamp, now)?;
        let snapshot = session.clone();

        if changed {
            self.persist(snapshot.clone());
        }
        Ok(snapshot)
    }

    /// Queue a durable write. Never blocks; failures are logged by the writer.
    pub fn persist(&self, session: WatchPartySession) {
        if self.persist_tx.send(PersistCommand::Save(session)).is_err() {
            tracing::error!("Persistence writer is gone, dropping durable write");
        }
    }

    /// Wait until every write queued so far has been attempted
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.persist_tx.send(PersistCommand::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }

    /// Number of sessions held in memory
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    pub fn backend_name(&self) -> &'static str {
        self.durable.name()
    }

    async fn load_cached(
        &mut self,
        session_id: &str,
    ) -> Result<&mut WatchPartySession, SessionError> {
        if !self.cache.contains_key(session_id) {
            match self.durable.load(session_id).await? {
                Some(session) => {
                    tracing::debug!(
                        session_id = %session_id,
                        backend = self.durable.name(),
                        "Rehydrated session from durable store"
                    );
                    self.cache.insert(session_id.to_string(), session);
                }
                None => return Err(SessionError::NotFound(session_id.to_string())),
            }
        }
        self.cache
            .get_mut(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }
}

/// Drains queued writes in order so a later state never loses to an earlier one.
async fn run_persist_writer(
    durable: Arc<dyn DurableStore>,
    mut rx: mpsc::UnboundedReceiver<PersistCommand>,
    hook: Option<PersistErrorHook>,
) {
    while let Some(command) = rx.recv().await {
        match command {
            PersistCommand::Save(session) => match durable.save(&session).await {
                Ok(()) => {
                    tracing::trace!(session_id = %session.session_id, "Persisted session");
                }
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        backend = durable.name(),
                        error = %e,
                        "Failed to persist session, in-memory state stays authoritative"
                    );
                    if let Some(hook) = &hook {
                        hook(&session, &e);
                    }
                }
            },
            PersistCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    tracing::debug!("Persistence writer stopped");
}
