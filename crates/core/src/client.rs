//! Per-viewer client synchronizer
//!
//! Headless state machine that sits between a video player and the sync
//! socket. The caller feeds it player callbacks and server messages; it
//! answers with the messages to send and the corrections to apply.
//!
//! ```text
//!   NotJoined ──join()──▶ AwaitingReady ◀──PAUSE── Ready
//!                              │  ▲                  ▲
//!                              │  └──── join reply ──┤ (isPlaying)
//!                              └────────PLAY─────────┘
//!        buffering: orthogonal flag on AwaitingReady / Ready
//! ```
//!
//! Playback must not start before [`ClientSynchronizer::join`]: browsers
//! block autoplay of embedded video until the user has interacted with the
//! page, so joining doubles as that gesture.

use crate::error::ClientSyncError;
use crate::handle::ClientHandle;
use crate::protocol::{Action, ClientMessage, ServerMessage, SyncMessage};

/// Remote corrections apply only when drift is strictly greater than this (seconds)
pub const REMOTE_DRIFT_TOLERANCE_SECS: f64 = 2.0;

/// Local progress jumps strictly greater than this count as a seek (seconds)
pub const LOCAL_SEEK_THRESHOLD_SECS: f64 = 1.5;

/// Drift thresholds used by the synchronizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncTolerances {
    pub remote_drift_secs: f64,
    pub local_seek_secs: f64,
}

impl Default for SyncTolerances {
    fn default() -> Self {
        Self {
            remote_drift_secs: REMOTE_DRIFT_TOLERANCE_SECS,
            local_seek_secs: LOCAL_SEEK_THRESHOLD_SECS,
        }
    }
}

/// Top-level viewer state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Player mounted, user has not joined yet
    NotJoined,
    /// Joined but paused (or still waiting for the join reply)
    AwaitingReady,
    /// Joined and playing
    Ready,
}

/// Outcome of feeding a server message to the synchronizer
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// Message does not concern this viewer (other session, own echo, stale reply)
    Ignored,
    /// Message applied; seek the player when `seek_to` is set
    Applied { seek_to: Option<f64> },
    /// Server reported an error for one of our requests
    Rejected { error: String, message: String },
}

/// Client-side synchronizer for one viewer of one session
#[derive(Debug, Clone)]
pub struct ClientSynchronizer {
    session_id: String,
    tolerances: SyncTolerances,
    state: ClientState,
    buffering: bool,
    handle: Option<ClientHandle>,
    last_played_seconds: f64,
}

impl ClientSynchronizer {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self::with_tolerances(session_id, SyncTolerances::default())
    }

    pub fn with_tolerances(session_id: impl Into<String>, tolerances: SyncTolerances) -> Self {
        Self {
            session_id: session_id.into(),
            tolerances,
            state: ClientState::NotJoined,
            buffering: false,
            handle: None,
            last_played_seconds: 0.0,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Handle issued by the server, once the join reply arrived
    pub fn handle(&self) -> Option<&ClientHandle> {
        self.handle.as_ref()
    }

    pub fn last_played_seconds(&self) -> f64 {
        self.last_played_seconds
    }

    /// Whether the player should be playing right now
    pub fn should_play(&self) -> bool {
        self.state == ClientState::Ready
    }

    /// User clicked "join": announce our local position and wait for the reply.
    pub fn join(&mut self, local_time: f64) -> Result<ClientMessage, ClientSyncError> {
        if self.state != ClientState::NotJoined {
            return Err(ClientSyncError::AlreadyJoined(self.session_id.clone()));
        }
        self.state = ClientState::AwaitingReady;
        self.last_played_seconds = local_time;
        Ok(ClientMessage::new(Action::Join, self.session_id.clone()).with_timestamp(local_time))
    }

    /// Feed a message received from the server.
    pub fn on_server_message(&mut self, message: &ServerMessage, local_time: f64) -> Reaction {
        match message {
            ServerMessage::Sync(sync) if sync.action == Action::Join => {
                self.on_join_reply(sync, local_time)
            }
            ServerMessage::Sync(sync) => self.on_broadcast(sync, local_time),
            ServerMessage::End(notice) => {
                if notice.session_id != self.session_id || !self.is_joined() {
                    return Reaction::Ignored;
                }
                tracing::debug!(session_id = %notice.session_id, "Session end notice received");
                Reaction::Applied { seek_to: None }
            }
            ServerMessage::Error(notice) => {
                if notice
                    .session_id
                    .as_deref()
                    .is_some_and(|id| id != self.session_id)
                {
                    return Reaction::Ignored;
                }
                let about_join = notice.action.map_or(true, |a| a == Action::Join);
                if self.awaiting_join_reply() && about_join {
                    self.state = ClientState::NotJoined;
                }
                Reaction::Rejected {
                    error: notice.error.clone(),
                    message: notice.message.clone(),
                }
            }
        }
    }

    /// Player started playing at `local_time`
    pub fn on_play(&mut self, local_time: f64) -> Option<ClientMessage> {
        if self.is_joined() {
            self.state = ClientState::Ready;
        }
        self.emit(Action::Play, local_time)
    }

    /// Player paused at `local_time`
    pub fn on_pause(&mut self, local_time: f64) -> Option<ClientMessage> {
        if self.is_joined() {
            self.state = ClientState::AwaitingReady;
        }
        self.emit(Action::Pause, local_time)
    }

    /// Player reported a user seek to `local_time`
    pub fn on_seek(&mut self, local_time: f64) -> Option<ClientMessage> {
        self.last_played_seconds = local_time;
        self.emit(Action::Seek, local_time)
    }

    /// Player stalled waiting for data
    pub fn on_buffer_start(&mut self, local_time: f64) -> Option<ClientMessage> {
        self.buffering = true;
        self.emit(Action::BufferStart, local_time)
    }

    /// Player resumed after a stall
    pub fn on_buffer_end(&mut self, local_time: f64) -> Option<ClientMessage> {
        self.buffering = false;
        self.emit(Action::BufferEnd, local_time)
    }

    /// Player reached the end of the video
    pub fn on_ended(&mut self, local_time: f64) -> Option<ClientMessage> {
        self.emit(Action::End, local_time)
    }

    /// Periodic progress tick from the player.
    ///
    /// A jump larger than the local seek threshold that the player did not
    /// report is announced as a `SEEK`, which also re-anchors the session when
    /// this viewer silently drifted.
    pub fn on_progress(&mut self, played_seconds: f64) -> Option<ClientMessage> {
        let jumped = (played_seconds - self.last_played_seconds).abs()
            > self.tolerances.local_seek_secs;
        let outbound = if !self.buffering && jumped {
            self.on_seek(played_seconds)
        } else {
            None
        };
        self.last_played_seconds = played_seconds;
        outbound
    }

    fn on_join_reply(&mut self, sync: &SyncMessage, local_time: f64) -> Reaction {
        if !self.awaiting_join_reply() || sync.session.session_id != self.session_id {
            return Reaction::Ignored;
        }
        self.handle = Some(sync.handle.clone());

        let remote = sync.session.timestamp;
        let seek_to = if remote == 0.0 {
            Some(0.0)
        } else {
            self.drift_correction(local_time, remote)
        };
        if let Some(position) = seek_to {
            self.last_played_seconds = position;
        }

        self.state = if sync.session.is_playing {
            ClientState::Ready
        } else {
            ClientState::AwaitingReady
        };
        tracing::debug!(
            session_id = %self.session_id,
            handle = %sync.handle,
            remote_timestamp = remote,
            playing = sync.session.is_playing,
            "Joined watch party"
        );
        Reaction::Applied { seek_to }
    }

    fn on_broadcast(&mut self, sync: &SyncMessage, local_time: f64) -> Reaction {
        if !self.is_joined() || sync.session.session_id != self.session_id {
            return Reaction::Ignored;
        }
        if self.handle.as_ref() == Some(&sync.handle) {
            return Reaction::Ignored;
        }

        let remote = sync.session.timestamp;
        let seek_to = match sync.action {
            Action::Play | Action::Pause | Action::Seek | Action::BufferStart => {
                self.drift_correction(local_time, remote)
            }
            _ => None,
        };

        match sync.action {
            Action::Play => {
                self.state = ClientState::Ready;
                self.buffering = false;
            }
            Action::Pause => self.state = ClientState::AwaitingReady,
            Action::BufferStart => self.buffering = true,
            Action::BufferEnd => self.buffering = false,
            Action::Seek => {
                if let Some(position) = seek_to {
                    self.last_played_seconds = position;
                }
            }
            Action::Join | Action::End => {}
        }

        Reaction::Applied { seek_to }
    }

    fn drift_correction(&self, local: f64, remote: f64) -> Option<f64> {
        ((local - remote).abs() > self.tolerances.remote_drift_secs).then_some(remote)
    }

    fn emit(&self, action: Action, local_time: f64) -> Option<ClientMessage> {
        if !self.is_joined() {
            return None;
        }
        Some(
            ClientMessage::new(action, self.session_id.clone())
                .with_timestamp(local_time)
                .with_handle(self.handle.clone()),
        )
    }

    fn is_joined(&self) -> bool {
        self.state != ClientState::NotJoined
    }

    /// Joined but no handle issued yet. Local play/pause may already have
    /// moved the state, so only the handle tells.
    fn awaiting_join_reply(&self) -> bool {
        self.is_joined() && self.handle.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::WatchPartySession;
    use chrono::Utc;

    fn session(timestamp: f64, is_playing: bool) -> WatchPartySession {
        let mut s = WatchPartySession::new("room", "https://example.com/v", Utc::now());
        s.timestamp = timestamp;
        s.is_playing = is_playing;
        s
    }

    fn sync(action: Action, handle: &str, timestamp: f64, is_playing: bool) -> ServerMessage {
        ServerMessage::sync(
            action,
            ClientHandle::from(handle),
            session(timestamp, is_playing),
        )
    }

    fn joined(handle: &str, local: f64) -> ClientSynchronizer {
        let mut client = ClientSynchronizer::new("room");
        client.join(local).unwrap();
        client.on_server_message(&sync(Action::Join, handle, local, true), local);
        client
    }

    #[test]
    fn test_join_moves_to_awaiting_ready() {
        let mut client = ClientSynchronizer::new("room");
        assert_eq!(client.state(), ClientState::NotJoined);
        assert!(!client.should_play());

        let msg = client.join(3.0).unwrap();
        assert_eq!(msg.action, Action::Join);
        assert_eq!(msg.timestamp, Some(3.0));
        assert_eq!(msg.handle, None);
        assert_eq!(client.state(), ClientState::AwaitingReady);

        assert_eq!(
            client.join(3.0),
            Err(ClientSyncError::AlreadyJoined("room".to_string()))
        );
    }

    #[test]
    fn test_events_before_join_are_not_sent() {
        let mut client = ClientSynchronizer::new("room");
        assert!(client.on_play(1.0).is_none());
        assert!(client.on_seek(10.0).is_none());
        assert!(client.on_progress(50.0).is_none());
    }

    #[test]
    fn test_join_reply_seeks_when_drift_exceeds_tolerance() {
        let mut client = ClientSynchronizer::new("room");
        client.join(0.5).unwrap();

        let reply = sync(Action::Join, "me", 15.0, true);
        let reaction = client.on_server_message(&reply, 0.5);

        assert_eq!(reaction, Reaction::Applied { seek_to: Some(15.0) });
        assert_eq!(client.state(), ClientState::Ready);
        assert_eq!(client.handle(), Some(&ClientHandle::from("me")));
    }

    #[test]
    fn test_join_reply_within_tolerance_does_not_seek() {
        let mut client = ClientSynchronizer::new("room");
        client.join(13.0).unwrap();

        let reply = sync(Action::Join, "me", 15.0, false);
        let reaction = client.on_server_message(&reply, 13.0);

        assert_eq!(reaction, Reaction::Applied { seek_to: None });
        assert_eq!(client.state(), ClientState::AwaitingReady);
        assert!(!client.should_play());
    }

    #[test]
    fn test_join_reply_without_prior_position_rewinds_to_zero() {
        let mut client = ClientSynchronizer::new("room");
        client.join(1.0).unwrap();

        let reply = sync(Action::Join, "me", 0.0, false);
        assert_eq!(
            client.on_server_message(&reply, 1.0),
            Reaction::Applied { seek_to: Some(0.0) }
        );
    }

    #[test]
    fn test_second_join_reply_is_ignored() {
        let mut client = joined("me", 5.0);
        let stray = sync(Action::Join, "other", 99.0, true);
        assert_eq!(client.on_server_message(&stray, 5.0), Reaction::Ignored);
        assert_eq!(client.handle(), Some(&ClientHandle::from("me")));
    }

    #[test]
    fn test_join_reply_accepted_after_local_play() {
        let mut client = ClientSynchronizer::new("room");
        client.join(0.0).unwrap();

        let early = client.on_play(0.0).unwrap();
        assert_eq!(early.handle, None);
        assert_eq!(client.state(), ClientState::Ready);

        let reply = sync(Action::Join, "issued", 50.0, true);
        assert_eq!(
            client.on_server_message(&reply, 0.0),
            Reaction::Applied { seek_to: Some(50.0) }
        );
        assert_eq!(client.handle(), Some(&ClientHandle::from("issued")));
        assert_eq!(client.last_played_seconds(), 50.0);

        // The server stamps our later actions with the issued handle.
        let echo = sync(Action::Pause, "issued", 10.0, false);
        assert_eq!(client.on_server_message(&echo, 50.0), Reaction::Ignored);
        assert_eq!(client.state(), ClientState::Ready);
    }

    #[test]
    fn test_join_reply_after_local_pause_follows_server_play_state() {
        let mut client = ClientSynchronizer::new("room");
        client.join(5.0).unwrap();
        client.on_play(5.0).unwrap();
        client.on_pause(6.0).unwrap();

        let reply = sync(Action::Join, "issued", 6.0, false);
        assert_eq!(
            client.on_server_message(&reply, 6.0),
            Reaction::Applied { seek_to: None }
        );
        assert_eq!(client.state(), ClientState::AwaitingReady);
        assert!(client.on_pause(6.0).unwrap().handle.is_some());
    }

    #[test]
    fn test_join_error_after_local_play_returns_to_not_joined() {
        let mut client = ClientSynchronizer::new("room");
        client.join(0.0).unwrap();
        client.on_play(0.0).unwrap();

        let err = ServerMessage::error(
            "session_not_found",
            "Session room not found",
            Some(Action::Join),
            Some("room".to_string()),
        );
        assert!(matches!(
            client.on_server_message(&err, 0.0),
            Reaction::Rejected { .. }
        ));
        assert_eq!(client.state(), ClientState::NotJoined);
        assert!(!client.should_play());
    }

    #[test]
    fn test_own_echo_is_ignored() {
        let mut client = joined("me", 5.0);
        let echo = sync(Action::Pause, "me", 80.0, false);

        assert_eq!(client.on_server_message(&echo, 5.0), Reaction::Ignored);
        assert_eq!(client.state(), ClientState::Ready);
    }

    #[test]
    fn test_other_session_broadcast_is_ignored() {
        let mut client = joined("me", 5.0);
        let mut other = session(80.0, false);
        other.session_id = "elsewhere".to_string();
        let msg = ServerMessage::sync(Action::Pause, ClientHandle::from("peer"), other);

        assert_eq!(client.on_server_message(&msg, 5.0), Reaction::Ignored);
    }

    #[test]
    fn test_remote_drift_boundary_is_exclusive() {
        let mut client = joined("me", 40.0);
        let msg = sync(Action::Seek, "peer", 42.0, true);

        assert_eq!(
            client.on_server_message(&msg, 40.0),
            Reaction::Applied { seek_to: None }
        );
        assert_eq!(
            client.on_server_message(&msg, 39.9),
            Reaction::Applied { seek_to: Some(42.0) }
        );
    }

    #[test]
    fn test_remote_pause_and_play_toggle_ready() {
        let mut client = joined("me", 10.0);

        let pause = sync(Action::Pause, "peer", 10.0, false);
        client.on_server_message(&pause, 10.0);
        assert_eq!(client.state(), ClientState::AwaitingReady);

        let buffer = sync(Action::BufferStart, "peer", 10.0, false);
        client.on_server_message(&buffer, 10.0);
        assert!(client.is_buffering());

        let play = sync(Action::Play, "peer", 10.0, true);
        client.on_server_message(&play, 10.0);
        assert_eq!(client.state(), ClientState::Ready);
        assert!(!client.is_buffering());
    }

    #[test]
    fn test_remote_seek_resets_progress_anchor() {
        let mut client = joined("me", 10.0);
        let seek = sync(Action::Seek, "peer", 300.0, true);

        assert_eq!(
            client.on_server_message(&seek, 10.0),
            Reaction::Applied { seek_to: Some(300.0) }
        );
        assert_eq!(client.last_played_seconds(), 300.0);
        // The jump we were told to make must not be re-announced.
        assert!(client.on_progress(300.5).is_none());
    }

    #[test]
    fn test_progress_threshold_is_exclusive() {
        let mut client = joined("me", 10.0);

        assert!(client.on_progress(11.5).is_none());
        let msg = client.on_progress(13.01).unwrap();
        assert_eq!(msg.action, Action::Seek);
        assert_eq!(msg.timestamp, Some(13.01));
        assert_eq!(msg.handle, Some(ClientHandle::from("me")));
    }

    #[test]
    fn test_reported_seek_is_not_announced_twice() {
        let mut client = joined("me", 10.0);

        let seek = client.on_seek(200.0).unwrap();
        assert_eq!(seek.timestamp, Some(200.0));
        assert!(client.on_progress(200.25).is_none());
    }

    #[test]
    fn test_progress_ignored_while_buffering() {
        let mut client = joined("me", 10.0);
        client.on_buffer_start(10.0).unwrap();

        assert!(client.on_progress(20.0).is_none());
        assert_eq!(client.last_played_seconds(), 20.0);

        let msg = client.on_buffer_end(20.0).unwrap();
        assert_eq!(msg.action, Action::BufferEnd);
        assert!(!client.is_buffering());
    }

    #[test]
    fn test_local_events_carry_handle_and_session() {
        let mut client = joined("me", 10.0);

        let pause = client.on_pause(12.0).unwrap();
        assert_eq!(pause.action, Action::Pause);
        assert_eq!(pause.session_id, "room");
        assert_eq!(pause.timestamp, Some(12.0));
        assert_eq!(client.state(), ClientState::AwaitingReady);

        let play = client.on_play(12.0).unwrap();
        assert_eq!(play.action, Action::Play);
        assert!(client.should_play());

        assert_eq!(client.on_ended(100.0).unwrap().action, Action::End);
    }

    #[test]
    fn test_join_error_returns_to_not_joined() {
        let mut client = ClientSynchronizer::new("room");
        client.join(0.0).unwrap();

        let err = ServerMessage::error(
            "session_not_found",
            "Session room not found",
            Some(Action::Join),
            Some("room".to_string()),
        );
        assert!(matches!(
            client.on_server_message(&err, 0.0),
            Reaction::Rejected { ref error, .. } if error == "session_not_found"
        ));
        assert_eq!(client.state(), ClientState::NotJoined);
        assert!(client.join(0.0).is_ok());
    }

    #[test]
    fn test_end_notice_is_a_no_op() {
        let mut client = joined("me", 10.0);
        let before = client.state();
        assert_eq!(
            client.on_server_message(&ServerMessage::end("room"), 10.0),
            Reaction::Applied { seek_to: None }
        );
        assert_eq!(client.state(), before);
    }
}
