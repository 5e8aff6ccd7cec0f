//! Inbound commands.
//!
//! Two layers:
//!
//! - [`ControlRequest`]: what the consumer side sends to the acquisition
//!   loop over the control channel (`START`, `TERMINATE`, `DESCRIBE`, or a
//!   controller command addressed to a named task).
//! - [`TaskCommand`]: the typed controller command itself.  Each controller
//!   family has its own variant; [`TaskCommand::from_wire`] accepts the
//!   `KEY` + delimited payload form used by operator consoles.

use std::fmt;

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::control::{BoostParams, Mode, ValveMode, boost_minutes_valid};
use crate::error::CommandError;
use crate::params::DescriptionMap;
use crate::schedule::SchedulePeg;

// ───────────────────────────────────────────────────────────────
// Control channel
// ───────────────────────────────────────────────────────────────

/// Request from the consumer side.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Build the buffer and start every task.
    Start,
    /// Leave the loop after the current iteration.
    Terminate,
    /// Reply with every parameter description.
    Describe,
    /// Forward to the task named `source`.
    Task { source: String, command: TaskCommand },
}

impl fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("START"),
            Self::Terminate => f.write_str("TERMINATE"),
            Self::Describe => f.write_str("DESCRIBE"),
            Self::Task { source, command } => write!(f, "{source}: {command:?}"),
        }
    }
}

/// Reply on the control channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlReply {
    /// `START` done (or failed with the message).
    Started(Result<(), String>),
    Descriptions(DescriptionMap),
    Command(Result<CommandResponse, CommandError>),
}

// ───────────────────────────────────────────────────────────────
// Controller commands
// ───────────────────────────────────────────────────────────────

/// Commands understood by the heater and grow-light controllers.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerCommand {
    SetMode(Mode),
    GetMode,
    /// Boost target and duration in minutes.
    SetBoost { target: f64, minutes: f64 },
    GetBoost,
    ClearSchedule,
    AddPeg(SchedulePeg),
    GetSchedule,
}

/// Commands understood by the sprinkler.
#[derive(Debug, Clone, PartialEq)]
pub enum SprinklerCommand {
    /// `valve` is zero-based.
    SetMode { valve: usize, mode: ValveMode },
    GetModes,
    ClearSchedule,
    AddPeg(SchedulePeg),
    GetSchedule,
}

/// A controller command, tagged by the controller family it targets.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskCommand {
    Thermostat(ControllerCommand),
    Illumination(ControllerCommand),
    Sprinkler(SprinklerCommand),
}

impl TaskCommand {
    /// Parse the wire form, e.g. `("HEATER:MODE", "BOOST")` or
    /// `("LIGHT_CTRL:SCHED_ADD", "2000,6,0,7,0")`.
    pub fn from_wire(key: &str, payload: &str) -> Result<Self, CommandError> {
        let (family, op) = key
            .trim()
            .split_once(':')
            .ok_or_else(|| CommandError::UnknownCommand(key.to_owned()))?;
        let unknown = || CommandError::UnknownCommand(key.to_owned());

        match family {
            "HEATER" => controller_command(op, payload).ok_or_else(unknown)?.map(Self::Thermostat),
            "LIGHT_CTRL" => controller_command(op, payload).ok_or_else(unknown)?.map(Self::Illumination),
            "SPRINK" => sprinkler_command(op, payload).ok_or_else(unknown)?.map(Self::Sprinkler),
            _ => Err(unknown()),
        }
    }

    /// Mode and boost changes take effect at once rather than on the next
    /// period.
    pub fn forces_heartbeat(&self) -> bool {
        match self {
            Self::Thermostat(c) | Self::Illumination(c) => {
                matches!(c, ControllerCommand::SetMode(_) | ControllerCommand::SetBoost { .. })
            }
            Self::Sprinkler(c) => matches!(c, SprinklerCommand::SetMode { .. }),
        }
    }
}

/// `None` for an unknown operation, `Some(Err)` for a bad payload.
fn controller_command(op: &str, payload: &str) -> Option<Result<ControllerCommand, CommandError>> {
    let cmd = match op {
        "MODE" => payload
            .parse::<Mode>()
            .map(ControllerCommand::SetMode)
            .map_err(|()| CommandError::InvalidPayload("mode must be OFF, AUTO or BOOST")),
        "MODE?" => Ok(ControllerCommand::GetMode),
        "BOOST_PARAMS" => parse_boost(payload),
        "BOOST_PARAMS?" => Ok(ControllerCommand::GetBoost),
        "SCHED_CLEAR" => Ok(ControllerCommand::ClearSchedule),
        "SCHED_ADD" => parse_peg(payload).map(ControllerCommand::AddPeg),
        "SCHED?" => Ok(ControllerCommand::GetSchedule),
        _ => return None,
    };
    Some(cmd)
}

fn sprinkler_command(op: &str, payload: &str) -> Option<Result<SprinklerCommand, CommandError>> {
    let cmd = match op {
        "MODE" => parse_valve_mode(payload),
        "MODE?" => Ok(SprinklerCommand::GetModes),
        "SCHED_CLEAR" => Ok(SprinklerCommand::ClearSchedule),
        "SCHED_ADD" => parse_peg(payload).map(SprinklerCommand::AddPeg),
        "SCHED?" => Ok(SprinklerCommand::GetSchedule),
        _ => return None,
    };
    Some(cmd)
}

fn fields(payload: &str) -> Vec<&str> {
    payload.split(',').map(str::trim).collect()
}

fn parse_boost(payload: &str) -> Result<ControllerCommand, CommandError> {
    const MSG: &str = "expected <target>,<minutes>";
    let [target, minutes] = fields(payload)[..] else {
        return Err(CommandError::InvalidPayload(MSG));
    };
    let target: f64 = target.parse().map_err(|_| CommandError::InvalidPayload(MSG))?;
    let minutes: f64 = minutes.parse().map_err(|_| CommandError::InvalidPayload(MSG))?;
    if !target.is_finite() {
        return Err(CommandError::InvalidPayload(MSG));
    }
    if !boost_minutes_valid(minutes) {
        return Err(CommandError::InvalidPayload("boost minutes out of range"));
    }
    Ok(ControllerCommand::SetBoost { target, minutes })
}

/// `target,start_h,start_m,stop_h,stop_m`
pub fn parse_peg(payload: &str) -> Result<SchedulePeg, CommandError> {
    const MSG: &str = "expected <target>,<h>,<m>,<h>,<m>";
    let [target, h0, m0, h1, m1] = fields(payload)[..] else {
        return Err(CommandError::InvalidPayload(MSG));
    };
    let target: f64 = target.parse().map_err(|_| CommandError::InvalidPayload(MSG))?;
    if !target.is_finite() {
        return Err(CommandError::InvalidPayload(MSG));
    }
    let num = |s: &str| s.parse::<u32>().map_err(|_| CommandError::InvalidPayload(MSG));
    Ok(SchedulePeg::new(target, num(h0)?, num(m0)?, num(h1)?, num(m1)?)?)
}

fn parse_valve_mode(payload: &str) -> Result<SprinklerCommand, CommandError> {
    const MSG: &str = "expected <valve>,<OFF|ON|AUTO>";
    let [valve, mode] = fields(payload)[..] else {
        return Err(CommandError::InvalidPayload(MSG));
    };
    let valve = valve.parse::<usize>().map_err(|_| CommandError::InvalidPayload(MSG))?;
    let mode = mode.parse::<ValveMode>().map_err(|()| CommandError::InvalidPayload(MSG))?;
    Ok(SprinklerCommand::SetMode { valve, mode })
}

// ───────────────────────────────────────────────────────────────
// Responses
// ───────────────────────────────────────────────────────────────

/// Result of a successful controller command.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum CommandResponse {
    /// Setters reply with nothing.
    None,
    Mode(Mode),
    Boost(BoostParams),
    Schedule(Vec<SchedulePeg>),
    ValveModes(Vec<ValveMode>),
}

impl CommandResponse {
    /// End of the boost, if one has been armed.
    pub fn boost_end(&self) -> Option<DateTime<Local>> {
        match self {
            Self::Boost(b) => b.ends,
            _ => None,
        }
    }
}
