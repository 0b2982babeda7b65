//! Metrics collection for the sync server
//!
//! Process-wide counters exposed as a JSON snapshot on `/metrics`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Sync server metrics collector
#[derive(Default)]
pub struct Metrics {
    /// WebSocket connections accepted since startup
    connections_opened: AtomicU64,

    /// WebSocket connections closed since startup
    connections_closed: AtomicU64,

    /// Currently open connections
    active_connections: AtomicU64,

    /// Inbound protocol messages
    messages_received: AtomicU64,

    /// Inbound messages dropped as malformed or answered with an error
    messages_rejected: AtomicU64,

    /// State broadcasts fanned out to a session
    broadcasts: AtomicU64,

    /// Outbound messages dropped because a connection's queue was full
    messages_dropped: AtomicU64,

    /// Direct replies (join replies and error notices)
    replies_sent: AtomicU64,

    /// Background durable writes that failed
    persistence_failures: AtomicU64,

    /// Sessions created through the bootstrap API
    sessions_created: AtomicU64,

    /// Startup timestamp (unix seconds)
    startup_time: AtomicU64,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        Self {
            startup_time: AtomicU64::new(now),
            ..Default::default()
        }
    }

    pub fn connection_opened(&self) {
        self.connections_opened.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
        // Saturate: a close without a matching open must not wrap around.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_rejected(&self) {
        self.messages_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn broadcast_sent(&self) {
        self.broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn messages_dropped(&self, count: u64) {
        self.messages_dropped.fetch_add(count, Ordering::Relaxed);
    }

    pub fn reply_sent(&self) {
        self.replies_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn persistence_failed(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_created(&self) {
        self.sessions_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        let uptime_secs = now.saturating_sub(self.startup_time.load(Ordering::Relaxed));

        MetricsSnapshot {
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_rejected: self.messages_rejected.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
            sessions_created: self.sessions_created.load(Ordering::Relaxed),
            uptime_secs,
        }
    }
}

/// Snapshot of current metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub active_connections: u64,
    pub messages_received: u64,
    pub messages_rejected: u64,
    pub broadcasts: u64,
    pub messages_dropped: u64,
    pub replies_sent: u64,
    pub persistence_failures: u64,
    pub sessions_created: u64,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl MetricsSnapshot {
    /// Inbound messages per second since startup
    pub fn messages_per_second(&self) -> f64 {
        if self.uptime_secs == 0 {
            0.0
        } else {
            self.messages_received as f64 / self.uptime_secs as f64
        }
    }
}

/// Global metrics instance
static GLOBAL_METRICS: std::sync::OnceLock<Arc<Metrics>> = std::sync::OnceLock::new();

/// Get the global metrics instance
pub fn global_metrics() -> Arc<Metrics> {
    GLOBAL_METRICS
        .get_or_init(|| Arc::new(Metrics::new()))
        .clone()
}
