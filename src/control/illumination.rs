//! Grow-light controller.
//!
//! Closes the loop on a lux sensor through an [`IntegralController`]: each
//! heartbeat moves the brightness by at most `max_step` percent toward the
//! target, so a passing cloud never slams the lamps between off and full.
//!
//! Brightness (0–100 %) is mapped linearly onto the `pwm_min..pwm_max`
//! duty band of the LED driver's 0–10 V interface and quantised to the
//! dimmer's step count.  The reported brightness is the value the
//! quantised duty actually produces.

use chrono::{DateTime, Local};
use embedded_hal::pwm::SetDutyCycle;
use log::{debug, warn};

use super::integral::IntegralController;
use super::{Mode, ModeControl, handle_setpoint_command, warn_schedule};
use crate::app::commands::{CommandResponse, TaskCommand};
use crate::config::{LightConfig, schedule_from};
use crate::drivers::pins::DimmerLine;
use crate::error::{CommandError, HardwareError};
use crate::params::{Category, ParameterDescription};
use crate::schedule::Schedule;
use crate::task::{PeriodicTask, TaskContext};

pub struct Illumination {
    cfg: LightConfig,
    modes: ModeControl,
    schedule: Schedule,
    ctrl: IntegralController,
    target: f64,
    dimmer: Option<DimmerLine>,
}

impl Illumination {
    pub fn new(cfg: LightConfig) -> Self {
        let schedule = schedule_from(&cfg.schedule);
        warn_schedule("Illumination", &schedule);
        let mut ctrl = IntegralController::new(cfg.gain, cfg.max_step);
        ctrl.set_limits(0.0, 100.0);
        Self {
            modes: ModeControl::new(cfg.mode, cfg.boost_target, cfg.boost_minutes),
            schedule,
            ctrl,
            target: 0.0,
            dimmer: None,
            cfg,
        }
    }

    /// Commanded brightness before quantisation.
    pub fn brightness(&self) -> f64 {
        self.ctrl.output()
    }

    fn slope(&self) -> f64 {
        (self.cfg.pwm_max - self.cfg.pwm_min) / 100.0
    }

    /// Brightness → dimmer steps.
    fn duty_steps(&self, brightness: f64) -> u16 {
        let duty_pct = (self.cfg.pwm_min + brightness * self.slope()).clamp(0.0, 100.0);
        (duty_pct * f64::from(self.cfg.pwm_range) / 100.0).round() as u16
    }

    /// Dimmer steps → the brightness they realise.
    fn realised(&self, steps: u16, brightness: f64) -> f64 {
        let slope = self.slope();
        if slope.abs() < f64::EPSILON {
            return brightness;
        }
        let duty_pct = f64::from(steps) * 100.0 / f64::from(self.cfg.pwm_range.max(1));
        (duty_pct - self.cfg.pwm_min) / slope
    }

    fn write(&mut self, brightness: f64) -> Result<f64, HardwareError> {
        let steps = self.duty_steps(brightness);
        if let Some(dimmer) = self.dimmer.as_mut() {
            dimmer.set_duty_cycle(steps)?;
        }
        Ok(self.realised(steps, brightness))
    }
}

impl PeriodicTask for Illumination {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        vec![
            ParameterDescription::float("Target", "Target", Category::Light, 0.0, 100_000.0, "lx"),
            ParameterDescription::float("Brightness", "light_level", Category::LightLevel, -10.0, 110.0, "%"),
        ]
    }

    fn startup(&mut self, ctx: &TaskContext) -> Result<(), HardwareError> {
        self.dimmer = Some(DimmerLine::new(ctx.hw.clone(), self.cfg.pin, self.cfg.pwm_range));
        self.ctrl.force(0.0);
        self.write(0.0).map(|_| ())
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        let mode = self.modes.effective(trigger);
        self.target = match mode {
            Mode::Boost => self.modes.boost().target,
            Mode::Auto => self.schedule.lookup(trigger.time()).map_or(0.0, |p| p.target),
            Mode::Off => 0.0,
        };

        let current = ctx.buffer.read_last(&self.cfg.sensor_source, &self.cfg.sensor_parameter);
        match current {
            Some((_, lux)) if mode != Mode::Off && self.target > 0.0 => {
                self.ctrl.set_target(self.target);
                self.ctrl.compute(lux);
            }
            _ => self.ctrl.force(0.0),
        }
        debug!(
            "Illumination: mode {mode}, target {} lx, reading {current:?}, brightness {:.1}%",
            self.target,
            self.ctrl.output()
        );

        match self.write(self.ctrl.output()) {
            Ok(actual) => ctx.emit("Brightness", trigger, actual),
            Err(e) => warn!("Illumination: dimmer write failed: {e}"),
        }
        ctx.emit("Target", trigger, self.target);
    }

    fn shutdown(&mut self, _ctx: &TaskContext) {
        if let Err(e) = self.write(0.0) {
            warn!("Illumination: dimmer write failed: {e}");
        }
    }

    fn command(&mut self, cmd: &TaskCommand, now: DateTime<Local>) -> Result<CommandResponse, CommandError> {
        let TaskCommand::Illumination(cmd) = cmd else {
            return Err(CommandError::Unsupported);
        };
        handle_setpoint_command("Illumination", &mut self.modes, &mut self.schedule, cmd, now)
    }
}
