//! Time-of-day schedules.
//!
//! A [`Schedule`] is an ordered list of [`SchedulePeg`]s, each carrying a
//! target value and a daily window.  The heater and the grow light take the
//! target of the matching peg as their AUTO setpoint; the sprinkler uses
//! the target as a valve index.
//!
//! ```text
//!   06:00      07:00      08:00                 18:00      19:00  19:30
//!     ├─ 2000 ───┼─ 4000 ───┼─────── 5000 ────────┼─ 3500 ───┼ 1000 ┤
//! ```
//!
//! Lookup scans the whole list and keeps the **last** match in list order.
//! Overlapping pegs are therefore resolved by position, not by start time.
//! [`Schedule::validate`] reports overlaps and inverted windows as warnings
//! so an editor can flag them; the runtime never rejects them.

use core::fmt;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ScheduleError;

/// Maximum number of pegs per schedule (stack-allocated).
pub const MAX_PEGS: usize = 32;

/// One schedule entry.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SchedulePeg {
    pub target: f64,
    pub start: NaiveTime,
    pub stop: NaiveTime,
}

impl SchedulePeg {
    pub fn new(
        target: f64,
        start_hour: u32,
        start_minute: u32,
        stop_hour: u32,
        stop_minute: u32,
    ) -> Result<Self, ScheduleError> {
        let start = NaiveTime::from_hms_opt(start_hour, start_minute, 0).ok_or(ScheduleError::InvalidTime)?;
        let stop = NaiveTime::from_hms_opt(stop_hour, stop_minute, 0).ok_or(ScheduleError::InvalidTime)?;
        Ok(Self { target, start, stop })
    }

    /// Strictly inside the window.  Inverted windows never match.
    pub fn matches(&self, now: NaiveTime) -> bool {
        self.start < now && now < self.stop
    }

    pub fn is_inverted(&self) -> bool {
        self.stop <= self.start
    }
}

impl fmt::Display for SchedulePeg {
    /// The `target,h,m,h,m` wire form.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.target,
            self.start.hour(),
            self.start.minute(),
            self.stop.hour(),
            self.stop.minute()
        )
    }
}

/// Validation finding.  Indices refer to list order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleWarning {
    /// Peg `later` starts before peg `earlier` (by start time) stops.
    Overlap { earlier: usize, later: usize },
    /// The peg stops at or before it starts and will never match.
    Inverted(usize),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schedule {
    pegs: heapless::Vec<SchedulePeg, MAX_PEGS>,
}

impl Schedule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pegs(pegs: &[SchedulePeg]) -> Result<Self, ScheduleError> {
        let mut schedule = Self::new();
        for peg in pegs {
            schedule.add(*peg)?;
        }
        Ok(schedule)
    }

    /// Append a peg at the end of the list.
    pub fn add(&mut self, peg: SchedulePeg) -> Result<(), ScheduleError> {
        self.pegs.push(peg).map_err(|_| ScheduleError::Full)
    }

    pub fn clear(&mut self) {
        self.pegs.clear();
    }

    pub fn pegs(&self) -> &[SchedulePeg] {
        &self.pegs
    }

    pub fn is_empty(&self) -> bool {
        self.pegs.is_empty()
    }

    /// Last peg in list order whose window contains `now`.
    pub fn lookup(&self, now: NaiveTime) -> Option<&SchedulePeg> {
        self.pegs.iter().rev().find(|p| p.matches(now))
    }

    /// Every peg whose window contains `now`, in list order.
    pub fn matching(&self, now: NaiveTime) -> impl Iterator<Item = &SchedulePeg> + '_ {
        self.pegs.iter().filter(move |p| p.matches(now))
    }

    /// Report inverted windows and pegs that overlap their successor by
    /// start time.
    pub fn validate(&self) -> Vec<ScheduleWarning> {
        let mut warnings: Vec<ScheduleWarning> = self
            .pegs
            .iter()
            .enumerate()
            .filter(|(_, p)| p.is_inverted())
            .map(|(i, _)| ScheduleWarning::Inverted(i))
            .collect();

        let mut order: Vec<usize> = (0..self.pegs.len()).filter(|&i| !self.pegs[i].is_inverted()).collect();
        order.sort_by_key(|&i| self.pegs[i].start);
        for pair in order.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if self.pegs[a].stop > self.pegs[b].start {
                warnings.push(ScheduleWarning::Overlap { earlier: a, later: b });
            }
        }
        warnings
    }
}
