//! DHT22 temperature/humidity sensor via the kernel IIO driver.
//!
//! The `dht11` IIO driver (which also handles the DHT22) exposes
//! `in_temp_input` and `in_humidityrelative_input` in milli-units.  The
//! sensor is slow and the driver frequently returns an I/O error; a cycle
//! emits both values or neither.

use std::path::PathBuf;

use chrono::{DateTime, Local};
use log::warn;

use super::climate_descriptions;
use crate::app::ports::HardwarePort;
use crate::config::Dht22Config;
use crate::error::HardwareError;
use crate::params::ParameterDescription;
use crate::task::{PeriodicTask, TaskContext};

pub struct Dht22 {
    device: PathBuf,
}

impl Dht22 {
    pub fn new(cfg: &Dht22Config) -> Self {
        Self {
            device: cfg.device.clone(),
        }
    }

    fn read_milli(&self, hw: &dyn HardwarePort, attr: &str) -> Result<f64, HardwareError> {
        let raw = hw.read_sysfs(&self.device.join(attr))?;
        let milli: i64 = raw.trim().parse().map_err(|_| HardwareError::ReadFailed)?;
        Ok(milli as f64 / 1000.0)
    }
}

impl PeriodicTask for Dht22 {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        climate_descriptions()
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        let hw = ctx.hw.as_ref();
        let reading = self
            .read_milli(hw, "in_temp_input")
            .and_then(|t| Ok((t, self.read_milli(hw, "in_humidityrelative_input")?)));
        match reading {
            Ok((temp, humid)) => {
                ctx.emit("Temp", trigger, temp);
                ctx.emit("Humid", trigger, humid);
            }
            Err(e) => warn!("{}: DHT22 read failed: {e}", ctx.source()),
        }
    }
}
