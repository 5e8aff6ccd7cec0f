//! DS18B20 one-wire temperature probe.
//!
//! Read through the kernel w1-therm driver's `w1_slave` file.  A bad CRC
//! is retried up to [`MAX_RETRIES`] times.  A missing device file or a run
//! of bad CRCs usually means the bus has locked up, so the probe supply is
//! power-cycled, at most once per [`RESET_INTERVAL`] so a dead probe does
//! not keep the others dark.

use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use chrono::{DateTime, Local, TimeDelta};
use log::{info, warn};

use super::temperature_description;
use crate::app::ports::HardwarePort;
use crate::config::Ds18b20Config;
use crate::drivers::w1::parse_w1_slave;
use crate::error::HardwareError;
use crate::params::ParameterDescription;
use crate::safety::expired;
use crate::task::{PeriodicTask, TaskContext};

pub const MAX_RETRIES: u32 = 4;
pub const RESET_INTERVAL: TimeDelta = TimeDelta::minutes(15);
const RETRY_DELAY: Duration = Duration::from_millis(200);

pub struct Ds18b20 {
    path: PathBuf,
    reset_pin: Option<u8>,
    reset_off: Duration,
    retry_delay: Duration,
    last_reset: Option<DateTime<Local>>,
}

impl Ds18b20 {
    pub fn new(cfg: &Ds18b20Config) -> Self {
        Self {
            path: cfg.w1_dir.join(&cfg.addr).join("w1_slave"),
            reset_pin: cfg.reset_pin,
            reset_off: Duration::from_secs(cfg.reset_off_secs),
            retry_delay: RETRY_DELAY,
            last_reset: None,
        }
    }

    fn read(&self, hw: &dyn HardwarePort) -> Result<f64, HardwareError> {
        let mut retries = 0;
        loop {
            match parse_w1_slave(&hw.read_sysfs(&self.path)?) {
                Err(HardwareError::ChecksumFailed) if retries < MAX_RETRIES => {
                    retries += 1;
                    thread::sleep(self.retry_delay);
                }
                other => return other,
            }
        }
    }

    /// Power-cycle the probe supply if allowed.  Returns whether it did.
    fn reset(&mut self, hw: &dyn HardwarePort, now: DateTime<Local>) -> bool {
        let Some(pin) = self.reset_pin else { return false };
        if !expired(self.last_reset, RESET_INTERVAL, now) {
            info!("DS18B20 reset skipped, last one at {:?}", self.last_reset);
            return false;
        }
        self.last_reset = Some(now);
        warn!("DS18B20: power-cycling probe supply on GPIO {pin}");
        if let Err(e) = hw.write_pin(pin, false) {
            warn!("DS18B20: reset failed: {e}");
            return false;
        }
        thread::sleep(self.reset_off);
        if let Err(e) = hw.write_pin(pin, true) {
            warn!("DS18B20: power restore failed: {e}");
        }
        true
    }
}

impl PeriodicTask for Ds18b20 {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        vec![temperature_description()]
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        match self.read(ctx.hw.as_ref()) {
            Ok(t) => ctx.emit("Temp", trigger, t),
            Err(e) => {
                warn!("{}: {} read failed: {e}", ctx.source(), self.path.display());
                if matches!(e, HardwareError::DeviceNotFound | HardwareError::ChecksumFailed) {
                    self.reset(ctx.hw.as_ref(), trigger);
                }
            }
        }
    }
}
