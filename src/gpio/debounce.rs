//! Time-window debounce for GPIO edges
//!
//! Mechanical contacts re-trigger for a few milliseconds per actuation.
//! Each registered line keeps the timestamp of its last accepted edge; an
//! edge is accepted iff it arrives strictly later than the window after
//! that. Acceptance refreshes the timestamp unconditionally, even when the
//! decoded event turns out to produce no step.

use std::time::Duration;

#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    last_accepted: Option<Duration>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_accepted: None,
        }
    }

    /// Decide whether an edge stamped `at` (monotonic) passes the filter.
    pub fn accept(&mut self, at: Duration) -> bool {
        if let Some(prev) = self.last_accepted {
            if at.saturating_sub(prev) <= self.window {
                return false;
            }
        }
        self.last_accepted = Some(at);
        true
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}
