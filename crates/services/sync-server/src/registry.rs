//! Connection registry with per-session subscriptions
//!
//! Owned by the engine task. Each open WebSocket has a bounded outbound
//! queue; a connection subscribes to at most one session, and broadcasts
//! only visit that session's subscribers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use watchparty_core::ClientHandle;

/// Process-unique identifier of one WebSocket connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocate the next identifier
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Result of queueing one message for one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Queue full; this message was dropped for this connection
    Dropped,
    /// Receiver gone; the connection was removed
    Closed,
    /// No such connection
    Unknown,
}

/// Per-broadcast delivery counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Fanout {
    pub delivered: usize,
    pub dropped: usize,
    pub closed: usize,
}

struct Connection {
    outbound: mpsc::Sender<String>,
    session_id: Option<String>,
    handle: Option<ClientHandle>,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    subscribers: HashMap<String, HashSet<ConnectionId>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, id: ConnectionId, outbound: mpsc::Sender<String>) {
        self.connections.insert(
            id,
            Connection {
                outbound,
                session_id: None,
                handle: None,
            },
        );
    }

    /// Forget a connection and its subscription. Returns whether it was known.
    pub fn unregister(&mut self, id: ConnectionId) -> bool {
        match self.connections.remove(&id) {
            Some(conn) => {
                if let Some(session_id) = conn.session_id {
                    self.remove_subscriber(&session_id, id);
                }
                true
            }
            None => false,
        }
    }

    /// Subscribe `id` to `session_id`, leaving any previous session, and
    /// remember the handle issued to it.
    pub fn subscribe(&mut self, id: ConnectionId, session_id: &str, handle: ClientHandle) -> bool {
        let Some(conn) = self.connections.get_mut(&id) else {
            return false;
        };
        let previous = conn.session_id.replace(session_id.to_string());
        conn.handle = Some(handle);

        if let Some(previous) = previous.filter(|p| p != session_id) {
            self.remove_subscriber(&previous, id);
        }
        self.subscribers
            .entry(session_id.to_string())
            .or_default()
            .insert(id);
        true
    }

    /// Handle issued to the connection by its last join
    pub fn handle_of(&self, id: ConnectionId) -> Option<&ClientHandle> {
        self.connections.get(&id).and_then(|c| c.handle.as_ref())
    }

    /// Session the connection is subscribed to
    pub fn session_of(&self, id: ConnectionId) -> Option<&str> {
        self.connections
            .get(&id)
            .and_then(|c| c.session_id.as_deref())
    }

    /// Queue `text` for one connection without waiting.
    pub fn send(&mut self, id: ConnectionId, text: String) -> Delivery {
        let Some(conn) = self.connections.get(&id) else {
            return Delivery::Unknown;
        };
        match conn.outbound.try_send(text) {
            Ok(()) => Delivery::Sent,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(connection_id = %id, "Outbound queue full, dropping message");
                Delivery::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!(connection_id = %id, "Outbound queue closed, removing connection");
                self.unregister(id);
                Delivery::Closed
            }
        }
    }

    /// Queue `text` for every subscriber of `session_id`.
    pub fn broadcast(&mut self, session_id: &str, text: &str) -> Fanout {
        let targets: Vec<ConnectionId> = match self.subscribers.get(session_id) {
            Some(ids) => ids.iter().copied().collect(),
            None => return Fanout::default(),
        };

        let mut fanout = Fanout::default();
        for id in targets {
            match self.send(id, text.to_string()) {
                Delivery::Sent => fanout.delivered += 1,
                Delivery::Dropped => fanout.dropped += 1,
                Delivery::Closed => fanout.closed += 1,
                Delivery::Unknown => {}
            }
        }
        fanout
    }

    pub fn subscriber_count(&self, session_id: &str) -> usize {
        self.subscribers.get(session_id).map_or(0, HashSet::len)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    fn remove_subscriber(&mut self, session_id: &str, id: ConnectionId) {
        if let Some(ids) = self.subscribers.get_mut(session_id) {
            ids.remove(&id);
            if ids.is_empty() {
                self.subscribers.remove(session_id);
            }
        }
    }
}
