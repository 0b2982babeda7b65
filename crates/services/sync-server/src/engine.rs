//! Sync engine
//!
//! One task owns the [`SessionRepository`] and the [`ConnectionRegistry`] and
//! consumes an explicit command queue, so every inbound message is applied,
//! persisted and fanned out before the next one is looked at. Socket tasks
//! and HTTP handlers talk to it through a cloneable [`EngineHandle`].
//!
//! ```text
//!  ws reader ─┐
//!  ws reader ─┼─▶ mpsc<EngineCommand> ─▶ SyncEngine ─┬─▶ outbound queue ─▶ ws writer
//!  REST API ──┘        (bounded)          (single)   └─▶ persist writer ─▶ DurableStore
//! ```

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use watchparty_core::{
    Action, ClientHandle, ClientMessage, Clock, ServerMessage, SessionError, SessionRepository,
    WatchPartySession,
};

use crate::error::EngineError;
use crate::metrics::Metrics;
use crate::registry::{ConnectionId, ConnectionRegistry, Delivery};

type Reply<T> = oneshot::Sender<Result<T, SessionError>>;

/// Commands accepted by the engine task
pub enum EngineCommand {
    /// A WebSocket was accepted
    Connect {
        connection_id: ConnectionId,
        outbound: mpsc::Sender<String>,
    },
    /// A WebSocket closed
    Disconnect { connection_id: ConnectionId },
    /// Text frame received on a WebSocket
    Inbound {
        connection_id: ConnectionId,
        text: String,
    },
    CreateSession {
        session_id: String,
        video_source: String,
        reply: Reply<WatchPartySession>,
    },
    GetSession {
        session_id: String,
        reply: Reply<WatchPartySession>,
    },
    /// Stop after flushing queued durable writes
    Shutdown { done: oneshot::Sender<()> },
}

/// Cloneable sender side of the engine queue
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineCommand>,
}

impl EngineHandle {
    pub async fn connect(
        &self,
        connection_id: ConnectionId,
        outbound: mpsc::Sender<String>,
    ) -> Result<(), EngineError> {
        self.send(EngineCommand::Connect {
            connection_id,
            outbound,
        })
        .await
    }

    pub async fn disconnect(&self, connection_id: ConnectionId) -> Result<(), EngineError> {
        self.send(EngineCommand::Disconnect { connection_id }).await
    }

    /// Queue a raw text frame. Waits only while the command queue is full.
    pub async fn inbound(
        &self,
        connection_id: ConnectionId,
        text: String,
    ) -> Result<(), EngineError> {
        self.send(EngineCommand::Inbound {
            connection_id,
            text,
        })
        .await
    }

    pub async fn create_session(
        &self,
        session_id: impl Into<String>,
        video_source: impl Into<String>,
    ) -> Result<WatchPartySession, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::CreateSession {
            session_id: session_id.into(),
            video_source: video_source.into(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| EngineError::Stopped)??)
    }

    pub async fn get_session(
        &self,
        session_id: impl Into<String>,
    ) -> Result<WatchPartySession, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineCommand::GetSession {
            session_id: session_id.into(),
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| EngineError::Stopped)??)
    }

    /// Ask the engine to flush and stop; resolves once it has.
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        let (done, rx) = oneshot::channel();
        self.send(EngineCommand::Shutdown { done }).await?;
        rx.await.map_err(|_| EngineError::Stopped)
    }

    async fn send(&self, command: EngineCommand) -> Result<(), EngineError> {
        self.tx.send(command).await.map_err(|_| EngineError::Stopped)
    }
}

/// Single-consumer sync engine
pub struct SyncEngine {
    repository: SessionRepository,
    registry: ConnectionRegistry,
    clock: Arc<dyn Clock>,
    metrics: Arc<Metrics>,
}

impl SyncEngine {
    pub fn new(
        repository: SessionRepository,
        clock: Arc<dyn Clock>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            repository,
            registry: ConnectionRegistry::new(),
            clock,
            metrics,
        }
    }

    /// Start the engine task with a command queue of `capacity`
    pub fn spawn(self, capacity: usize) -> (EngineHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let task = tokio::spawn(self.run(rx));
        (EngineHandle { tx }, task)
    }

    async fn run(mut self, mut rx: mpsc::Receiver<EngineCommand>) {
        tracing::info!(
            backend = self.repository.backend_name(),
            "Sync engine started"
        );

        let mut done = None;
        while let Some(command) = rx.recv().await {
            match command {
                EngineCommand::Connect {
                    connection_id,
                    outbound,
                } => {
                    self.registry.register(connection_id, outbound);
                    self.metrics.connection_opened();
                    tracing::debug!(connection_id = %connection_id, "Connection registered");
                }
                EngineCommand::Disconnect { connection_id } => {
                    if self.registry.unregister(connection_id) {
                        self.metrics.connection_closed();
                    }
                    tracing::debug!(connection_id = %connection_id, "Connection removed");
                }
                EngineCommand::Inbound {
                    connection_id,
                    text,
                } => self.handle_inbound(connection_id, &text).await,
                EngineCommand::CreateSession {
                    session_id,
                    video_source,
                    reply,
                } => {
                    let now = self.clock.now();
                    let result = self.repository.create(&session_id, &video_source, now).await;
                    if result.is_ok() {
                        self.metrics.session_created();
                    }
                    let _ = reply.send(result);
                }
                EngineCommand::GetSession { session_id, reply } => {
                    let _ = reply.send(self.repository.get(&session_id).await);
                }
                EngineCommand::Shutdown { done: tx } => {
                    done = Some(tx);
                    break;
                }
            }
        }

        self.repository.flush().await;
        tracing::info!(
            connections = self.registry.len(),
            sessions = self.repository.cached_len(),
            "Sync engine stopped"
        );
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    async fn handle_inbound(&mut self, connection_id: ConnectionId, text: &str) {
        self.metrics.message_received();

        let message = match ClientMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    error = %e,
                    "Dropping malformed message"
                );
                self.metrics.message_rejected();
                return;
            }
        };

        let now = self.clock.now();
        let session = match self
            .repository
            .apply(&message.session_id, message.action, message.timestamp, now)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(
                    connection_id = %connection_id,
                    session_id = %message.session_id,
                    action = %message.action,
                    error = %e,
                    "Rejected client message"
                );
                self.metrics.message_rejected();
                let notice = ServerMessage::error(
                    e.code(),
                    e.to_string(),
                    Some(message.action),
                    Some(message.session_id.clone()),
                );
                self.reply(connection_id, &notice);
                return;
            }
        };

        match message.action {
            Action::Join => {
                let handle = ClientHandle::generate();
                self.registry
                    .subscribe(connection_id, &session.session_id, handle.clone());
                tracing::info!(
                    connection_id = %connection_id,
                    session_id = %session.session_id,
                    handle = %handle,
                    timestamp = session.timestamp,
                    "Viewer joined session"
                );
                self.reply(connection_id, &ServerMessage::sync(Action::Join, handle, session));
            }
            Action::Play | Action::Pause | Action::Seek | Action::BufferStart => {
                let handle = message
                    .handle
                    .or_else(|| self.registry.handle_of(connection_id).cloned())
                    .unwrap_or_else(ClientHandle::generate);
                tracing::debug!(
                    session_id = %session.session_id,
                    action = %message.action,
                    timestamp = session.timestamp,
                    "Broadcasting state change"
                );
                let update = ServerMessage::sync(message.action, handle, session);
                self.broadcast(&message.session_id, &update);
            }
            Action::BufferEnd => {}
            Action::End => {
                tracing::info!(session_id = %session.session_id, "Session ended");
                self.broadcast(&message.session_id, &ServerMessage::end(&session.session_id));
            }
        }
    }

    fn reply(&mut self, connection_id: ConnectionId, message: &ServerMessage) {
        let Some(text) = encode(message) else {
            return;
        };
        match self.registry.send(connection_id, text) {
            Delivery::Sent => self.metrics.reply_sent(),
            Delivery::Dropped => self.metrics.messages_dropped(1),
            Delivery::Closed => self.metrics.connection_closed(),
            Delivery::Unknown => {}
        }
    }

    fn broadcast(&mut self, session_id: &str, message: &ServerMessage) {
        let Some(text) = encode(message) else {
            return;
        };
        let fanout = self.registry.broadcast(session_id, &text);
        self.metrics.broadcast_sent();
        if fanout.dropped > 0 {
            self.metrics.messages_dropped(fanout.dropped as u64);
        }
        for _ in 0..fanout.closed {
            self.metrics.connection_closed();
        }
    }
}

fn encode(message: &ServerMessage) -> Option<String> {
    match message.to_json() {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode server message");
            None
        }
    }
}
