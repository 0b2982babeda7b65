//! In-memory durable store
//!
//! Backs the `memory` storage backend and the test suites. Writes can be
//! switched to fail to exercise the best-effort persistence path.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::DurableStore;
use crate::error::StorageError;
use crate::session::WatchPartySession;

#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, WatchPartySession>>,
    fail_writes: AtomicBool,
    loads: AtomicUsize,
    saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a record directly, bypassing the write-failure switch
    pub fn seed(&self, session: WatchPartySession) {
        self.records
            .lock()
            .insert(session.session_id.clone(), session);
    }

    /// Copy of the stored record
    pub fn snapshot(&self, session_id: &str) -> Option<WatchPartySession> {
        self.records.lock().get(session_id).cloned()
    }

    /// Make every subsequent `insert` / `save` fail
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    /// Number of `load` calls served
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Number of successful `save` calls
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable(
                "memory store writes disabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl DurableStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self, session_id: &str) -> Result<Option<WatchPartySession>, StorageError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.snapshot(session_id))
    }

    async fn insert(&self, session: &WatchPartySession) -> Result<bool, StorageError> {
        self.check_writable()?;
        let mut records = self.records.lock();
        if records.contains_key(&session.session_id) {
            return Ok(false);
        }
        records.insert(session.session_id.clone(), session.clone());
        Ok(true)
    }

    async fn save(&self, session: &WatchPartySession) -> Result<(), StorageError> {
        self.check_writable()?;
        self.records
            .lock()
            .insert(session.session_id.clone(), session.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
