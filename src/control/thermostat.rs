//! Heater thermostat with optional fan.
//!
//! On/off control of the heater against the latest reading of one
//! temperature parameter in the shared buffer.
//!
//! - **OFF**: demand off (the minimum on-time still applies).
//! - **AUTO**: target from the schedule, or the default target when no peg
//!   matches.
//! - **BOOST**: boost target until the boost expires.
//!
//! Heat demand passes through a [`DwellGuard`].  When a fan is fitted it
//! starts as soon as heat is demanded, the heater may only engage once the
//! fan has run for the prestart time, and the fan keeps running for the
//! overrun time after the heater goes off.
//!
//! A missing reading means no demand: a dead sensor must never leave the
//! heater running.

use chrono::{DateTime, Local, TimeDelta};
use log::debug;

use super::{ModeControl, drive, handle_setpoint_command, warn_schedule};
use crate::app::commands::{CommandResponse, TaskCommand};
use crate::config::{HeaterConfig, schedule_from};
use crate::control::Mode;
use crate::drivers::pins::OutputLine;
use crate::error::{CommandError, HardwareError};
use crate::params::{Category, ParameterDescription};
use crate::safety::{DwellGuard, expired};
use crate::schedule::Schedule;
use crate::task::{PeriodicTask, TaskContext};

pub struct Thermostat {
    cfg: HeaterConfig,
    modes: ModeControl,
    schedule: Schedule,
    guard: DwellGuard,
    target: f64,
    /// Demand from the last cycle, for the hysteresis band.
    demand: bool,
    heat: Option<OutputLine>,
    fan: Option<OutputLine>,
    fan_on: bool,
    fan_since: Option<DateTime<Local>>,
}

impl Thermostat {
    pub fn new(cfg: HeaterConfig) -> Self {
        let schedule = schedule_from(&cfg.schedule);
        warn_schedule("Thermostat", &schedule);
        Self {
            modes: ModeControl::new(cfg.mode, cfg.boost_target, cfg.boost_minutes),
            guard: DwellGuard::new(
                TimeDelta::seconds(cfg.min_on_secs),
                TimeDelta::seconds(cfg.min_off_secs),
                TimeDelta::seconds(cfg.max_on_secs),
            ),
            target: cfg.default_target,
            demand: false,
            heat: None,
            fan: None,
            fan_on: false,
            fan_since: None,
            schedule,
            cfg,
        }
    }

    pub fn is_heating(&self) -> bool {
        self.guard.is_on()
    }

    pub fn is_fan_on(&self) -> bool {
        self.fan_on
    }

    fn update_target(&mut self, mode: Mode, now: DateTime<Local>) {
        match mode {
            Mode::Boost => self.target = self.modes.boost().target,
            Mode::Auto => {
                self.target = self
                    .schedule
                    .lookup(now.time())
                    .map_or(self.cfg.default_target, |p| p.target);
            }
            Mode::Off => {}
        }
    }

    fn wants_heat(&self, current: f64) -> bool {
        current < self.target || (self.demand && current < self.target + self.cfg.hysteresis)
    }

    fn apply(&mut self, demand: bool, now: DateTime<Local>) {
        let has_fan = self.cfg.fan_pin.is_some();

        if has_fan && demand && !self.fan_on {
            self.fan_on = true;
            self.fan_since = Some(now);
        }
        let fan_ready = !has_fan || expired(self.fan_since, TimeDelta::seconds(self.cfg.fan_prestart_secs), now);

        let allow = self.guard.is_on() || fan_ready;
        let heating = self.guard.request(demand && allow, now);

        if has_fan && !demand && !heating {
            let overrun = TimeDelta::seconds(self.cfg.fan_overrun_secs);
            self.fan_on = self.guard.last_off().is_some_and(|off| now <= off + overrun);
        }

        drive("Thermostat heat", self.heat.as_mut(), heating);
        if has_fan {
            drive("Thermostat fan", self.fan.as_mut(), self.fan_on);
        }
    }
}

impl PeriodicTask for Thermostat {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        let mut d = vec![
            ParameterDescription::float("Target", "Target", Category::Temperature, -10.0, 40.0, "\u{b0}C"),
            ParameterDescription::float("Heat", "Heater", Category::HeatLevel, -10.0, 110.0, "%"),
        ];
        if self.cfg.fan_pin.is_some() {
            d.push(ParameterDescription::float("Fan", "Fan", Category::FanLevel, -10.0, 110.0, "%"));
        }
        d
    }

    fn startup(&mut self, ctx: &TaskContext) -> Result<(), HardwareError> {
        let mut heat = OutputLine::new(ctx.hw.clone(), self.cfg.heat_pin);
        heat.set(false)?;
        self.heat = Some(heat);
        if let Some(pin) = self.cfg.fan_pin {
            let mut fan = OutputLine::new(ctx.hw.clone(), pin);
            fan.set(false)?;
            self.fan = Some(fan);
        }
        self.guard.reset();
        Ok(())
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        let mode = self.modes.effective(trigger);
        self.update_target(mode, trigger);

        let current = ctx.buffer.read_last(&self.cfg.sensor_source, &self.cfg.sensor_parameter);
        let demand = match (mode, current) {
            (Mode::Off, _) | (_, None) => false,
            (_, Some((_, value))) => self.wants_heat(value),
        };
        debug!("Thermostat: mode {mode}, target {}, reading {current:?}, demand {demand}", self.target);
        self.demand = demand;
        self.apply(demand, trigger);

        ctx.emit("Heat", trigger, if self.guard.is_on() { 100.0 } else { 0.0 });
        ctx.emit("Target", trigger, self.target);
        if self.cfg.fan_pin.is_some() {
            ctx.emit("Fan", trigger, if self.fan_on { 100.0 } else { 0.0 });
        }
    }

    fn shutdown(&mut self, _ctx: &TaskContext) {
        drive("Thermostat heat", self.heat.as_mut(), false);
        drive("Thermostat fan", self.fan.as_mut(), false);
    }

    fn command(&mut self, cmd: &TaskCommand, now: DateTime<Local>) -> Result<CommandResponse, CommandError> {
        let TaskCommand::Thermostat(cmd) = cmd else {
            return Err(CommandError::Unsupported);
        };
        handle_setpoint_command("Thermostat", &mut self.modes, &mut self.schedule, cmd, now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::commands::ControllerCommand;
    use crate::control::fixture::{Fixture, context};
    use chrono::TimeZone;

    const HEAT: u8 = 23;
    const FAN: u8 = 24;

    /// 03:00 local on some day, so no default schedule peg interferes.
    fn at(secs: i64) -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 1, 10, 3, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn heater(fan: bool, mode: Mode) -> (Thermostat, Fixture) {
        let cfg = HeaterConfig {
            heat_pin: HEAT,
            fan_pin: fan.then_some(FAN),
            sensor_source: "probe".into(),
            mode,
            ..HeaterConfig::default()
        };
        let mut t = Thermostat::new(cfg);
        let fx = context("heater", &t, ("probe", "Temp", Category::Temperature));
        t.startup(&fx.ctx).unwrap();
        (t, fx)
    }

    fn reading(fx: &Fixture, secs: i64, value: f64) {
        fx.ctx.buffer.push("probe", "Temp", at(secs), value);
    }

    #[test]
    fn auto_without_schedule_uses_default_target() {
        let (mut t, fx) = heater(false, Mode::Auto);
        reading(&fx, 0, 5.0);
        t.heartbeat(at(0), &fx.ctx);
        let out = fx.drain();
        assert_eq!(out["Target"], 12.0);
        assert_eq!(out["Heat"], 100.0);
        assert_eq!(fx.hw.pin_level(HEAT), Some(true));
    }

    #[test]
    fn off_mode_never_heats() {
        let (mut t, fx) = heater(false, Mode::Off);
        reading(&fx, 0, -5.0);
        t.heartbeat(at(0), &fx.ctx);
        assert_eq!(fx.drain()["Heat"], 0.0);
        assert!(!t.is_heating());
    }

    #[test]
    fn missing_reading_means_no_demand() {
        let (mut t, fx) = heater(false, Mode::Auto);
        t.heartbeat(at(0), &fx.ctx);
        assert!(!t.is_heating());
    }

    #[test]
    fn min_on_time_holds_against_readings() {
        let (mut t, fx) = heater(false, Mode::Auto);
        reading(&fx, 0, 5.0);
        t.heartbeat(at(0), &fx.ctx);
        assert!(t.is_heating());

        for s in (4..=180).step_by(4) {
            reading(&fx, s, 30.0);
            t.heartbeat(at(s), &fx.ctx);
            assert!(t.is_heating(), "heater dropped out after {s}s");
        }
        reading(&fx, 184, 30.0);
        t.heartbeat(at(184), &fx.ctx);
        assert!(!t.is_heating());
    }

    #[test]
    fn max_on_time_cuts_out() {
        let (mut t, fx) = heater(false, Mode::Auto);
        let mut s = 0;
        while s <= 3600 {
            reading(&fx, s, 0.0);
            t.heartbeat(at(s), &fx.ctx);
            assert!(t.is_heating(), "heater off at {s}s");
            s += 10;
        }
        reading(&fx, 3610, 0.0);
        t.heartbeat(at(3610), &fx.ctx);
        assert!(!t.is_heating());
        assert_eq!(fx.hw.pin_level(HEAT), Some(false));
    }

    #[test]
    fn hysteresis_keeps_demand() {
        let (mut t, fx) = heater(false, Mode::Auto);
        t.cfg.hysteresis = 1.0;
        t.cfg.min_on_secs = 0;
        t.guard = DwellGuard::new(TimeDelta::zero(), TimeDelta::zero(), TimeDelta::hours(10));
        reading(&fx, 0, 11.0);
        t.heartbeat(at(0), &fx.ctx);
        reading(&fx, 10, 12.5);
        t.heartbeat(at(10), &fx.ctx);
        assert!(t.is_heating());
        reading(&fx, 20, 13.0);
        t.heartbeat(at(20), &fx.ctx);
        assert!(!t.is_heating());
    }

    #[test]
    fn fan_prestarts_and_overruns() {
        let (mut t, fx) = heater(true, Mode::Auto);
        reading(&fx, 0, 5.0);
        t.heartbeat(at(0), &fx.ctx);
        // Fan first, heater waits for the prestart.
        assert!(t.is_fan_on());
        assert!(!t.is_heating());
        assert_eq!(fx.hw.pin_level(FAN), Some(true));

        t.heartbeat(at(11), &fx.ctx);
        assert!(t.is_heating());

        // Satisfied: heater off after min-on, fan overruns.
        reading(&fx, 200, 30.0);
        t.heartbeat(at(200), &fx.ctx);
        assert!(!t.is_heating());
        assert!(t.is_fan_on());
        t.heartbeat(at(380), &fx.ctx);
        assert!(t.is_fan_on());
        t.heartbeat(at(381), &fx.ctx);
        assert!(!t.is_fan_on());
        assert_eq!(fx.hw.pin_level(FAN), Some(false));
        assert_eq!(fx.drain()["Fan"], 0.0);
    }

    #[test]
    fn boost_overrides_then_reverts() {
        let (mut t, fx) = heater(false, Mode::Off);
        t.command(&TaskCommand::Thermostat(ControllerCommand::SetBoost { target: 25.0, minutes: 1.0 }), at(0))
            .unwrap();
        t.command(&TaskCommand::Thermostat(ControllerCommand::SetMode(Mode::Boost)), at(0)).unwrap();
        reading(&fx, 0, 20.0);
        t.heartbeat(at(0), &fx.ctx);
        assert_eq!(fx.drain()["Target"], 25.0);
        assert!(t.is_heating());

        t.heartbeat(at(61), &fx.ctx);
        let mode = t.command(&TaskCommand::Thermostat(ControllerCommand::GetMode), at(61)).unwrap();
        assert_eq!(mode, CommandResponse::Mode(Mode::Off));
    }

    #[test]
    fn unrepresentable_boost_is_refused() {
        let (mut t, fx) = heater(false, Mode::Off);
        t.modes = ModeControl::new(Mode::Off, 20.0, 1e12);
        let err = t.command(&TaskCommand::Thermostat(ControllerCommand::SetMode(Mode::Boost)), at(0));
        assert!(matches!(err, Err(CommandError::InvalidPayload(_))));

        reading(&fx, 0, 5.0);
        t.heartbeat(at(0), &fx.ctx);
        assert!(!t.is_heating());
        let mode = t.command(&TaskCommand::Thermostat(ControllerCommand::GetMode), at(0)).unwrap();
        assert_eq!(mode, CommandResponse::Mode(Mode::Off));
    }

    #[test]
    fn schedule_sets_auto_target() {
        let (mut t, fx) = heater(false, Mode::Auto);
        let peg = crate::schedule::SchedulePeg::new(18.0, 2, 0, 4, 0).unwrap();
        t.command(&TaskCommand::Thermostat(ControllerCommand::AddPeg(peg)), at(0)).unwrap();
        reading(&fx, 0, 15.0);
        t.heartbeat(at(0), &fx.ctx);
        assert_eq!(fx.drain()["Target"], 18.0);
        let sched = t.command(&TaskCommand::Thermostat(ControllerCommand::GetSchedule), at(0)).unwrap();
        assert_eq!(sched, CommandResponse::Schedule(vec![peg]));
    }

    #[test]
    fn rejects_other_families() {
        let (mut t, _fx) = heater(false, Mode::Auto);
        let cmd = TaskCommand::Illumination(ControllerCommand::GetMode);
        assert_eq!(t.command(&cmd, at(0)), Err(CommandError::Unsupported));
    }
}
