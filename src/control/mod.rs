//! Closed-loop actuator controllers.
//!
//! ```text
//!   shared buffer ──latest reading──▶ controller ──OutputPin / SetDutyCycle──▶ hardware
//!                                          ▲
//!   schedule / mode / boost ───────────────┘
//! ```
//!
//! Every controller is a [`PeriodicTask`](crate::task::PeriodicTask),
//! usually wired as a slave of the sensor it regulates so it runs straight
//! after a fresh reading.

pub mod illumination;
pub mod integral;
pub mod sprinkler;
pub mod thermostat;

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Local, TimeDelta};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::app::commands::{CommandResponse, ControllerCommand};
use crate::drivers::pins::OutputLine;
use crate::error::CommandError;
use crate::schedule::Schedule;

/// Operating mode of the heater and grow-light controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Mode {
    Off,
    Auto,
    Boost,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Off => "OFF",
            Self::Auto => "AUTO",
            Self::Boost => "BOOST",
        })
    }
}

impl FromStr for Mode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "OFF" => Ok(Self::Off),
            "AUTO" => Ok(Self::Auto),
            "BOOST" => Ok(Self::Boost),
            _ => Err(()),
        }
    }
}

/// Per-valve mode.  ON and OFF override the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ValveMode {
    Auto,
    On,
    Off,
}

impl FromStr for ValveMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "AUTO" => Ok(Self::Auto),
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            _ => Err(()),
        }
    }
}

/// Longest accepted boost: one week.
pub const MAX_BOOST_MINUTES: f64 = 7.0 * 24.0 * 60.0;

/// Boost parameters as reported to the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoostParams {
    pub target: f64,
    pub minutes: f64,
    /// End of the current (or last) boost.
    pub ends: Option<DateTime<Local>>,
}

/// Mode selector with a self-expiring boost.
///
/// Entering BOOST records the mode to return to and arms the end time.
/// Re-entering BOOST while boosted only re-arms the end time.
#[derive(Debug, Clone)]
pub struct ModeControl {
    mode: Mode,
    before_boost: Mode,
    boost: BoostParams,
}

impl ModeControl {
    pub fn new(mode: Mode, boost_target: f64, boost_minutes: f64) -> Self {
        Self {
            mode: if mode == Mode::Boost { Mode::Auto } else { mode },
            before_boost: Mode::Auto,
            boost: BoostParams {
                target: boost_target,
                minutes: boost_minutes,
                ends: None,
            },
        }
    }

    /// Switch mode.  Entering BOOST fails, leaving the mode untouched, when
    /// the boost end is not representable.
    pub fn set_mode(&mut self, mode: Mode, now: DateTime<Local>) -> Result<(), CommandError> {
        if mode == Mode::Boost {
            let ends = minutes(self.boost.minutes)
                .and_then(|d| now.checked_add_signed(d))
                .ok_or(CommandError::InvalidPayload("boost duration out of range"))?;
            if self.mode != Mode::Boost {
                self.before_boost = self.mode;
            }
            self.boost.ends = Some(ends);
        }
        self.mode = mode;
        Ok(())
    }

    /// Current mode after expiring a finished boost.
    pub fn effective(&mut self, now: DateTime<Local>) -> Mode {
        if self.mode == Mode::Boost && self.boost.ends.is_none_or(|end| now > end) {
            info!("Boost expired, back to {}", self.before_boost);
            self.mode = self.before_boost;
        }
        self.mode
    }

    /// Mode as last set, without expiring anything.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_boost_params(&mut self, target: f64, minutes: f64) {
        self.boost.target = target;
        self.boost.minutes = minutes;
    }

    pub fn boost(&self) -> BoostParams {
        self.boost
    }
}

/// `true` for a boost length the controllers accept.
pub fn boost_minutes_valid(m: f64) -> bool {
    (0.0..=MAX_BOOST_MINUTES).contains(&m)
}

fn minutes(m: f64) -> Option<TimeDelta> {
    if !boost_minutes_valid(m) {
        return None;
    }
    TimeDelta::try_milliseconds((m * 60_000.0).round() as i64)
}

/// Command handling shared by the heater and the grow light.
pub(crate) fn handle_setpoint_command(
    label: &str,
    modes: &mut ModeControl,
    schedule: &mut Schedule,
    cmd: &ControllerCommand,
    now: DateTime<Local>,
) -> Result<CommandResponse, CommandError> {
    match cmd {
        ControllerCommand::SetMode(mode) => {
            info!("{label}: mode {} -> {mode}", modes.mode());
            modes.set_mode(*mode, now)?;
            Ok(CommandResponse::None)
        }
        ControllerCommand::GetMode => Ok(CommandResponse::Mode(modes.mode())),
        ControllerCommand::SetBoost { target, minutes } => {
            if !target.is_finite() || !boost_minutes_valid(*minutes) {
                return Err(CommandError::InvalidPayload("boost minutes out of range"));
            }
            modes.set_boost_params(*target, *minutes);
            Ok(CommandResponse::None)
        }
        ControllerCommand::GetBoost => Ok(CommandResponse::Boost(modes.boost())),
        ControllerCommand::ClearSchedule => {
            schedule.clear();
            Ok(CommandResponse::None)
        }
        ControllerCommand::AddPeg(peg) => {
            schedule.add(*peg)?;
            warn_schedule(label, schedule);
            Ok(CommandResponse::None)
        }
        ControllerCommand::GetSchedule => Ok(CommandResponse::Schedule(schedule.pegs().to_vec())),
    }
}

/// Log validation findings.  The schedule is kept as is.
pub(crate) fn warn_schedule(label: &str, schedule: &Schedule) {
    for w in schedule.validate() {
        warn!("{label}: schedule {w:?}");
    }
}

/// Drive a line, logging rather than failing the heartbeat.
pub(crate) fn drive(label: &str, line: Option<&mut OutputLine>, on: bool) -> bool {
    match line.map(|l| l.set(on)) {
        Some(Ok(())) => true,
        Some(Err(e)) => {
            warn!("{label}: output write failed: {e}");
            false
        }
        None => false,
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Local> {
        Local.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn mode_wire_names() {
        assert_eq!("BOOST".parse::<Mode>(), Ok(Mode::Boost));
        assert_eq!(" AUTO ".parse::<Mode>(), Ok(Mode::Auto));
        assert!("boost".parse::<Mode>().is_err());
        assert_eq!(Mode::Off.to_string(), "OFF");
        assert_eq!("ON".parse::<ValveMode>(), Ok(ValveMode::On));
    }

    #[test]
    fn boost_expires_to_previous_mode() {
        let mut m = ModeControl::new(Mode::Off, 20.0, 60.0);
        m.set_mode(Mode::Boost, at(0)).unwrap();
        assert_eq!(m.effective(at(3600)), Mode::Boost);
        assert_eq!(m.effective(at(3601)), Mode::Off);
    }

    #[test]
    fn reboost_keeps_original_mode() {
        let mut m = ModeControl::new(Mode::Auto, 20.0, 1.0);
        m.set_mode(Mode::Boost, at(0)).unwrap();
        m.set_mode(Mode::Boost, at(50)).unwrap();
        assert_eq!(m.effective(at(100)), Mode::Boost);
        assert_eq!(m.effective(at(111)), Mode::Auto);
    }

    #[test]
    fn boost_params_update() {
        let mut m = ModeControl::new(Mode::Auto, 20.0, 60.0);
        m.set_boost_params(25.0, 15.0);
        m.set_mode(Mode::Boost, at(0)).unwrap();
        let b = m.boost();
        assert!((b.target - 25.0).abs() < f64::EPSILON);
        assert_eq!(b.ends, Some(at(900)));
    }

    #[test]
    fn oversized_boost_is_rejected_without_panicking() {
        let mut m = ModeControl::new(Mode::Off, 20.0, 1e12);
        assert_eq!(
            m.set_mode(Mode::Boost, at(0)),
            Err(CommandError::InvalidPayload("boost duration out of range"))
        );
        assert_eq!(m.mode(), Mode::Off);
        assert_eq!(m.effective(at(1)), Mode::Off);

        let mut schedule = Schedule::default();
        let cmd = ControllerCommand::SetBoost { target: 20.0, minutes: 1e12 };
        assert!(matches!(
            handle_setpoint_command("Heater", &mut m, &mut schedule, &cmd, at(0)),
            Err(CommandError::InvalidPayload(_))
        ));
        assert!((m.boost().minutes - 1e12).abs() < 1.0);
    }

    #[test]
    fn boost_limit_is_inclusive() {
        let mut m = ModeControl::new(Mode::Auto, 20.0, MAX_BOOST_MINUTES);
        m.set_mode(Mode::Boost, at(0)).unwrap();
        assert_eq!(m.boost().ends, Some(at(7 * 24 * 3600)));
        assert!(!boost_minutes_valid(MAX_BOOST_MINUTES + 1.0));
        assert!(!boost_minutes_valid(-1.0));
        assert!(!boost_minutes_valid(f64::NAN));
    }
}
