//! BH1750 ambient light sensor (I2C).
//!
//! One-time high-resolution mode: the command starts a single 1 lx
//! resolution measurement and the sensor powers down afterwards.  The two
//! result bytes are big-endian counts; lux = counts / 1.2.

use chrono::{DateTime, Local};
use log::warn;

use crate::config::Bh1750Config;
use crate::params::{Category, ParameterDescription};
use crate::task::{PeriodicTask, TaskContext};

/// One-time H-resolution mode.
const ONE_TIME_HIGH_RES: u8 = 0x20;

pub struct Bh1750 {
    addr: u8,
}

impl Bh1750 {
    pub fn new(cfg: &Bh1750Config) -> Self {
        Self { addr: cfg.addr }
    }

    pub fn description() -> ParameterDescription {
        ParameterDescription::float("Light", "Light", Category::Light, 0.0, 100_000.0, "lx")
    }
}

fn counts_to_lux(b: [u8; 2]) -> f64 {
    (f64::from(b[1]) + 256.0 * f64::from(b[0])) / 1.2
}

impl PeriodicTask for Bh1750 {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        vec![Self::description()]
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        let mut buf = [0u8; 2];
        match ctx.hw.i2c_read(self.addr, ONE_TIME_HIGH_RES, &mut buf) {
            Ok(()) => ctx.emit("Light", trigger, counts_to_lux(buf)),
            Err(e) => warn!("{}: BH1750 @0x{:02x} read failed: {e}", ctx.source(), self.addr),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::fixture::context;

    #[test]
    fn converts_counts() {
        assert!((counts_to_lux([0x01, 0x2c]) - 250.0).abs() < 1e-9);
        assert!(counts_to_lux([0, 0]).abs() < 1e-9);
    }

    #[test]
    fn failed_read_emits_nothing() {
        let mut s = Bh1750::new(&Bh1750Config { addr: 0x23 });
        let fx = context("lux", &s, ("x", "x", Category::Unknown));
        s.heartbeat(Local::now(), &fx.ctx);
        assert!(fx.drain().is_empty());

        fx.hw.set_i2c_response(0x23, &[0x12, 0x00]);
        s.heartbeat(Local::now(), &fx.ctx);
        assert!((fx.drain()["Light"] - 3840.0).abs() < 1e-9);
    }
}
