//! Stand-in for a video player: a playhead that advances with wall time
//! while playing.

use std::time::{Duration, Instant};

pub struct SimulatedPlayer {
    position: f64,
    playing: bool,
    stalled: bool,
    last_tick: Instant,
}

impl SimulatedPlayer {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    fn starting_at(now: Instant) -> Self {
        Self {
            position: 0.0,
            playing: false,
            stalled: false,
            last_tick: now,
        }
    }

    /// Playhead in seconds
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Advance the playhead to `now`
    pub fn tick(&mut self) -> f64 {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> f64 {
        let elapsed = now.saturating_duration_since(self.last_tick);
        self.last_tick = now;
        if self.playing && !self.stalled {
            self.position += elapsed.as_secs_f64();
        }
        self.position
    }

    pub fn set_playing(&mut self, playing: bool) {
        self.tick();
        self.playing = playing;
    }

    /// A stalled player keeps its play state but does not advance
    pub fn set_stalled(&mut self, stalled: bool) {
        self.tick();
        self.stalled = stalled;
    }

    pub fn seek(&mut self, to: f64) {
        self.tick();
        self.position = to.max(0.0);
    }

    /// Jump without telling anyone, as a player does after a hiccup
    pub fn skip(&mut self, by: Duration) {
        self.tick();
        self.position += by.as_secs_f64();
    }
}

impl Default for SimulatedPlayer {
    fn default() -> Self {
        Self::new()
    }
}
