//! SQLite durable store
//!
//! One row per session in `watch_party`. rusqlite is blocking, so each call
//! runs on the blocking pool with the connection behind a mutex.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Arc;

use super::DurableStore;
use crate::error::StorageError;
use crate::session::WatchPartySession;

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Create or open the database at `db_path`
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// Private in-memory database
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(include_str!("sqlite_schema.sql"))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StorageError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let conn = conn.lock();
            f(&conn)
        })
        .await
        .map_err(|e| StorageError::Task(e.to_string()))?
    }
}

fn row_to_session(
    session_id: String,
    video_source: String,
    timestamp: f64,
    updated_ms: i64,
    is_playing: bool,
) -> Result<WatchPartySession, StorageError> {
    let time_of_last_update = Utc
        .timestamp_millis_opt(updated_ms)
        .single()
        .ok_or_else(|| StorageError::Corrupt {
            session_id: session_id.clone(),
            reason: format!("time_of_last_update {} out of range", updated_ms),
        })?;

    Ok(WatchPartySession {
        session_id,
        video_source,
        timestamp,
        time_of_last_update,
        is_playing,
    })
}

#[async_trait]
impl DurableStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn load(&self, session_id: &str) -> Result<Option<WatchPartySession>, StorageError> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let row = conn
                .query_row(
                    "SELECT session_id, video_source, timestamp, time_of_last_update, is_playing
                     FROM watch_party
                     WHERE session_id = ?",
                    params![session_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, f64>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, bool>(4)?,
                        ))
                    },
                )
                .optional()?;

            row.map(|(id, source, timestamp, updated_ms, playing)| {
                row_to_session(id, source, timestamp, updated_ms, playing)
            })
            .transpose()
        })
        .await
    }

    async fn insert(&self, session: &WatchPartySession) -> Result<bool, StorageError> {
        let session = session.clone();
        self.with_conn(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO watch_party (
                    session_id, video_source, timestamp, time_of_last_update, is_playing
                 ) VALUES (?, ?, ?, ?, ?)",
                params![
                    session.session_id,
                    session.video_source,
                    session.timestamp,
                    session.time_of_last_update.timestamp_millis(),
                    session.is_playing,
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn save(&self, session: &WatchPartySession) -> Result<(), StorageError> {
        let session = session.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO watch_party (
                    session_id, video_source, timestamp, time_of_last_update, is_playing
                 ) VALUES (?, ?, ?, ?, ?)
                 ON CONFLICT(session_id) DO UPDATE SET
                    video_source = excluded.video_source,
                    timestamp = excluded.timestamp,
                    time_of_last_update = excluded.time_of_last_update,
                    is_playing = excluded.is_playing",
                params![
                    session.session_id,
                    session.video_source,
                    session.timestamp,
                    session.time_of_last_update.timestamp_millis(),
                    session.is_playing,
                ],
            )?;
            Ok(())
        })
        .await
    }
}
