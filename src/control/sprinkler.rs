//! Irrigation valve controller.
//!
//! Each valve has its own mode.  In AUTO a valve is open while any
//! schedule peg whose target names that valve (zero-based index) covers
//! the current time of day; ON and OFF override the schedule outright.

use chrono::{DateTime, Local};
use log::warn;

use super::{ValveMode, drive, warn_schedule};
use crate::app::commands::{CommandResponse, SprinklerCommand, TaskCommand};
use crate::config::{SprinklerConfig, schedule_from};
use crate::drivers::pins::OutputLine;
use crate::error::{CommandError, HardwareError};
use crate::params::{Category, ParameterDescription};
use crate::schedule::Schedule;
use crate::task::{PeriodicTask, TaskContext};

struct Valve {
    name: String,
    pin: u8,
    mode: ValveMode,
    open: bool,
    line: Option<OutputLine>,
}

pub struct Sprinkler {
    valves: Vec<Valve>,
    schedule: Schedule,
}

impl Sprinkler {
    pub fn new(cfg: &SprinklerConfig) -> Self {
        let valves = cfg
            .valve_pins
            .iter()
            .enumerate()
            .map(|(k, &pin)| Valve {
                name: cfg.valve_names.get(k).cloned().unwrap_or_else(|| (k + 1).to_string()),
                pin,
                mode: ValveMode::Off,
                open: false,
                line: None,
            })
            .collect();
        let schedule = schedule_from(&cfg.schedule);
        warn_schedule("Sprinkler", &schedule);
        Self { valves, schedule }
    }

    pub fn is_open(&self, valve: usize) -> Option<bool> {
        self.valves.get(valve).map(|v| v.open)
    }

    /// Valves the schedule wants open at `now`.
    fn scheduled(&self, now: DateTime<Local>) -> Vec<bool> {
        let mut open = vec![false; self.valves.len()];
        for peg in self.schedule.matching(now.time()) {
            match valve_index(peg.target, open.len()) {
                Some(k) => open[k] = true,
                None => warn!("Sprinkler: peg names no valve ({})", peg.target),
            }
        }
        open
    }
}

fn valve_index(target: f64, count: usize) -> Option<usize> {
    (target >= 0.0 && target.fract() == 0.0 && target < count as f64).then_some(target as usize)
}

impl PeriodicTask for Sprinkler {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        self.valves
            .iter()
            .map(|v| ParameterDescription::float(&v.name, "Sprinkler", Category::ValvePosition, -10.0, 110.0, "%"))
            .collect()
    }

    fn startup(&mut self, ctx: &TaskContext) -> Result<(), HardwareError> {
        for v in &mut self.valves {
            let mut line = OutputLine::new(ctx.hw.clone(), v.pin);
            line.set(false)?;
            v.line = Some(line);
            v.open = false;
        }
        Ok(())
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        let scheduled = self.scheduled(trigger);
        for (v, auto_open) in self.valves.iter_mut().zip(scheduled) {
            v.open = match v.mode {
                ValveMode::On => true,
                ValveMode::Off => false,
                ValveMode::Auto => auto_open,
            };
            drive("Sprinkler", v.line.as_mut(), v.open);
            ctx.emit(&v.name, trigger, if v.open { 100.0 } else { 0.0 });
        }
    }

    fn shutdown(&mut self, _ctx: &TaskContext) {
        for v in &mut self.valves {
            drive("Sprinkler", v.line.as_mut(), false);
            v.open = false;
        }
    }

    fn command(&mut self, cmd: &TaskCommand, _now: DateTime<Local>) -> Result<CommandResponse, CommandError> {
        let TaskCommand::Sprinkler(cmd) = cmd else {
            return Err(CommandError::Unsupported);
        };
        match cmd {
            SprinklerCommand::SetMode { valve, mode } => {
                let v = self.valves.get_mut(*valve).ok_or(CommandError::InvalidValve(*valve))?;
                log::info!("Sprinkler: valve {} -> {mode:?}", v.name);
                v.mode = *mode;
                Ok(CommandResponse::None)
            }
            SprinklerCommand::GetModes => Ok(CommandResponse::ValveModes(self.valves.iter().map(|v| v.mode).collect())),
            SprinklerCommand::ClearSchedule => {
                self.schedule.clear();
                Ok(CommandResponse::None)
            }
            SprinklerCommand::AddPeg(peg) => {
                self.schedule.add(*peg)?;
                warn_schedule("Sprinkler", &self.schedule);
                Ok(CommandResponse::None)
            }
            SprinklerCommand::GetSchedule => Ok(CommandResponse::Schedule(self.schedule.pegs().to_vec())),
        }
    }
}
