//! Comparator-based soil moisture probes.
//!
//! One PWM reference line feeds every probe's comparator.  The reference
//! is swept from 0 to 95 % in 5 % steps; a probe's moisture is the first
//! level at which its comparator output goes high, or 100 % if it never
//! does.  The reference is parked at 50 % between sweeps.

use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local};
use embedded_hal::pwm::SetDutyCycle;
use log::warn;

use crate::app::ports::HardwarePort;
use crate::config::MoistureConfig;
use crate::drivers::pins::DimmerLine;
use crate::error::HardwareError;
use crate::params::{Category, ParameterDescription};
use crate::task::{PeriodicTask, TaskContext};

const REF_RANGE: u16 = 100;
const REF_PARK: u8 = 50;
const SWEEP_STEP: usize = 5;

pub struct MoistureSensor {
    ref_pin: u8,
    det_pins: Vec<u8>,
    settle: Duration,
    reference: Option<DimmerLine>,
}

impl MoistureSensor {
    pub fn new(cfg: &MoistureConfig) -> Self {
        Self {
            ref_pin: cfg.ref_pin,
            det_pins: cfg.det_pins.clone(),
            settle: Duration::from_millis(cfg.settle_ms),
            reference: None,
        }
    }

    fn sweep(reference: &mut DimmerLine, hw: &dyn HardwarePort, det: u8, settle: Duration) -> Result<f64, HardwareError> {
        for level in (0..100).step_by(SWEEP_STEP) {
            reference.set_duty_cycle_percent(level as u8)?;
            thread::sleep(settle);
            if hw.read_pin(det)? {
                return Ok(level as f64);
            }
        }
        Ok(100.0)
    }
}

impl PeriodicTask for MoistureSensor {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        (1..=self.det_pins.len())
            .map(|k| ParameterDescription::float(&k.to_string(), "Moisture", Category::Moisture, 0.0, 100.0, "%"))
            .collect()
    }

    fn startup(&mut self, ctx: &TaskContext) -> Result<(), HardwareError> {
        let mut reference = DimmerLine::new(ctx.hw.clone(), self.ref_pin, REF_RANGE);
        reference.set_duty_cycle_percent(REF_PARK)?;
        self.reference = Some(reference);
        Ok(())
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        let Some(reference) = self.reference.as_mut() else { return };
        for (k, &det) in self.det_pins.iter().enumerate() {
            match Self::sweep(reference, ctx.hw.as_ref(), det, self.settle) {
                Ok(pct) => ctx.emit(&(k + 1).to_string(), trigger, pct),
                Err(e) => warn!("{}: moisture probe {} (GPIO {det}) failed: {e}", ctx.source(), k + 1),
            }
        }
        if let Err(e) = reference.set_duty_cycle_percent(REF_PARK) {
            warn!("{}: reference park failed: {e}", ctx.source());
        }
    }

    fn shutdown(&mut self, ctx: &TaskContext) {
        if let Some(Err(e)) = self.reference.as_mut().map(SetDutyCycle::set_duty_cycle_fully_off) {
            warn!("{}: reference off failed: {e}", ctx.source());
        }
    }
}
