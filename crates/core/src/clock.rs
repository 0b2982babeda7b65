//! Wall-clock sources and playhead extrapolation

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::session::WatchPartySession;

/// Current playhead of `session` at `now`, in seconds.
///
/// Playing sessions advance by the wall-clock time elapsed since the last
/// write; paused sessions report the stored position exactly. A `now` that
/// precedes the last write (clock skew) contributes no elapsed time.
pub fn extrapolate(session: &WatchPartySession, now: DateTime<Utc>) -> f64 {
    if !session.is_playing {
        return session.timestamp;
    }
    let elapsed_ms = (now - session.time_of_last_update)
        .num_milliseconds()
        .max(0);
    session.timestamp + elapsed_ms as f64 / 1000.0
}

/// Source of "now" for the sync engine
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for deterministic tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}
