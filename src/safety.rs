//! Actuator dwell guard.
//!
//! Wraps a binary actuator (the heater) with three timing rules evaluated
//! on every request:
//!
//! 1. **Minimum off-time**: once off, stays off for `min_off`.
//! 2. **Minimum on-time**: once on, stays on for `min_on`, whatever the
//!    demand (including an OFF mode).
//! 3. **Maximum on-time**: after `max_on` of continuous operation the
//!    output is forced off with a warning.  The minimum off-time then
//!    applies before it may come back.
//!
//! All timers start out expired, so the first request takes effect
//! immediately.  Time is passed in by the caller (the heartbeat trigger
//! time), which keeps the guard deterministic under test.

use chrono::{DateTime, Local, TimeDelta};
use log::{debug, warn};

#[derive(Debug, Clone)]
pub struct DwellGuard {
    min_on: TimeDelta,
    min_off: TimeDelta,
    max_on: TimeDelta,
    on: bool,
    /// `None` means "long ago".
    last_on: Option<DateTime<Local>>,
    last_off: Option<DateTime<Local>>,
}

impl DwellGuard {
    pub fn new(min_on: TimeDelta, min_off: TimeDelta, max_on: TimeDelta) -> Self {
        Self {
            min_on,
            min_off,
            max_on,
            on: false,
            last_on: None,
            last_off: None,
        }
    }

    /// Apply `demand` subject to the dwell rules.  Returns the new state.
    pub fn request(&mut self, demand: bool, now: DateTime<Local>) -> bool {
        let next = match (self.on, demand) {
            (false, true) => expired(self.last_off, self.min_off, now),
            (true, true) => {
                if expired(self.last_on, self.max_on, now) {
                    warn!("Dwell guard: on continuously for over {}s, forcing off", self.max_on.num_seconds());
                    false
                } else {
                    true
                }
            }
            (true, false) => !expired(self.last_on, self.min_on, now),
            (false, false) => false,
        };

        if next != self.on {
            debug!("Dwell guard: {} -> {}", self.on, next);
            if next {
                self.last_on = Some(now);
            } else {
                self.last_off = Some(now);
            }
            self.on = next;
        }
        self.on
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn last_on(&self) -> Option<DateTime<Local>> {
        self.last_on
    }

    pub fn last_off(&self) -> Option<DateTime<Local>> {
        self.last_off
    }

    /// Expire every timer, as at construction.
    pub fn reset(&mut self) {
        self.last_on = None;
        self.last_off = None;
    }
}

/// True once strictly more than `dwell` has passed since `since`.
pub(crate) fn expired(since: Option<DateTime<Local>>, dwell: TimeDelta, now: DateTime<Local>) -> bool {
    since.is_none_or(|t| now > t + dwell)
}
