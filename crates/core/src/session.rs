//! Canonical playback record for a watch party
//!
//! A [`WatchPartySession`] is a snapshot: `timestamp` is the playhead as of
//! `time_of_last_update`, never a live value. Every transition rewrites the
//! reference instant together with the position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::clock::extrapolate;
use crate::error::SessionError;
use crate::protocol::Action;

/// Playback state shared by every viewer of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchPartySession {
    /// Unique session identifier
    pub session_id: String,

    /// Reference to the externally hosted video
    #[serde(alias = "youtubeLink")]
    pub video_source: String,

    /// Playhead position in seconds as of `time_of_last_update`
    pub timestamp: f64,

    /// Wall-clock instant of the last write (epoch milliseconds on the wire)
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub time_of_last_update: DateTime<Utc>,

    /// Whether the shared playhead is advancing
    pub is_playing: bool,
}

impl WatchPartySession {
    /// Fresh paused session positioned at zero
    pub fn new(
        session_id: impl Into<String>,
        video_source: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            video_source: video_source.into(),
            timestamp: 0.0,
            time_of_last_update: now,
            is_playing: false,
        }
    }

    /// Playhead position at `now`
    pub fn position_at(&self, now: DateTime<Utc>) -> f64 {
        extrapolate(self, now)
    }

    /// Apply a protocol action to the record.
    ///
    /// Returns `true` when the record was rewritten (and therefore needs to be
    /// persisted), `false` for actions that carry no canonical state change.
    pub fn apply(
        &mut self,
        action: Action,
        timestamp: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        match action {
            Action::Join => {
                // Fold elapsed play time into the snapshot, then restart the clock.
                self.timestamp = extrapolate(self, now);
                self.time_of_last_update = now;
                Ok(true)
            }
            Action::Play => {
                self.rewrite(action, timestamp, now)?;
                self.is_playing = true;
                Ok(true)
            }
            Action::Pause => {
                self.rewrite(action, timestamp, now)?;
                self.is_playing = false;
                Ok(true)
            }
            Action::Seek | Action::BufferStart => {
                self.rewrite(action, timestamp, now)?;
                Ok(true)
            }
            Action::BufferEnd | Action::End => Ok(false),
        }
    }

    fn rewrite(
        &mut self,
        action: Action,
        timestamp: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<(), SessionError> {
        let position = timestamp
            .filter(|t| t.is_finite() && *t >= 0.0)
            .ok_or(SessionError::MissingTimestamp {
                action: action.as_str(),
            })?;
        self.timestamp = position;
        self.time_of_last_update = now;
        Ok(())
    }
}
