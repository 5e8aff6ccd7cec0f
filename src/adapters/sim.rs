//! In-memory hardware backend.
//!
//! Used when `simulate_hardware` is set and by every test that needs a
//! [`HardwarePort`].  Outputs are recorded so tests can assert on them;
//! inputs (digital levels, sysfs files, I2C replies) are scripted up front.
//! Comparator inputs can be wired to a PWM reference line so the moisture
//! sweep sees a realistic trip point.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{debug, info};
use parking_lot::Mutex;

use crate::app::ports::HardwarePort;
use crate::error::HardwareError;

#[derive(Debug, Clone, Copy)]
struct Comparator {
    reference: u8,
    trip_pct: f64,
}

#[derive(Default)]
struct SimState {
    acquired: bool,
    outputs: HashMap<u8, bool>,
    pwm: HashMap<u8, (u16, u16)>,
    inputs: HashMap<u8, bool>,
    comparators: HashMap<u8, Comparator>,
    files: HashMap<PathBuf, String>,
    i2c: HashMap<u8, Vec<u8>>,
    fail_reads: bool,
    fail_writes: bool,
    acquire_count: u32,
}

impl SimState {
    fn check(&self) -> Result<(), HardwareError> {
        if self.acquired { Ok(()) } else { Err(HardwareError::NotAcquired) }
    }

    fn check_read(&self) -> Result<(), HardwareError> {
        self.check()?;
        if self.fail_reads { Err(HardwareError::ReadFailed) } else { Ok(()) }
    }

    fn check_write(&self) -> Result<(), HardwareError> {
        self.check()?;
        if self.fail_writes { Err(HardwareError::WriteFailed) } else { Ok(()) }
    }
}

pub struct SimulatedHardware {
    state: Mutex<SimState>,
}

impl SimulatedHardware {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn is_acquired(&self) -> bool {
        self.state.lock().acquired
    }

    /// How many times the backend has been acquired.
    pub fn acquire_count(&self) -> u32 {
        self.state.lock().acquire_count
    }

    /// Last level written to an output, `None` if never written.
    pub fn pin_level(&self, pin: u8) -> Option<bool> {
        self.state.lock().outputs.get(&pin).copied()
    }

    /// Last `(duty, range)` written to a PWM line.
    pub fn pwm(&self, pin: u8) -> Option<(u16, u16)> {
        self.state.lock().pwm.get(&pin).copied()
    }

    pub fn set_input(&self, pin: u8, high: bool) {
        self.state.lock().inputs.insert(pin, high);
    }

    /// Make `pin` read high whenever the duty on `reference` is at or
    /// above `trip_pct` percent.
    pub fn set_comparator(&self, pin: u8, reference: u8, trip_pct: f64) {
        self.state.lock().comparators.insert(pin, Comparator { reference, trip_pct });
    }

    pub fn set_file(&self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        self.state.lock().files.insert(path.into(), contents.into());
    }

    pub fn remove_file(&self, path: &Path) {
        self.state.lock().files.remove(path);
    }

    pub fn set_i2c_response(&self, addr: u8, bytes: &[u8]) {
        self.state.lock().i2c.insert(addr, bytes.to_vec());
    }

    /// Every read fails with [`HardwareError::ReadFailed`] while set.
    pub fn fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// Every write fails with [`HardwareError::WriteFailed`] while set.
    pub fn fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }
}

impl Default for SimulatedHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl HardwarePort for SimulatedHardware {
    fn acquire(&self) -> Result<(), HardwareError> {
        let mut s = self.state.lock();
        s.acquired = true;
        s.acquire_count += 1;
        info!("Simulated hardware acquired");
        Ok(())
    }

    fn release(&self) {
        let mut s = self.state.lock();
        for level in s.outputs.values_mut() {
            *level = false;
        }
        for (duty, _) in s.pwm.values_mut() {
            *duty = 0;
        }
        s.acquired = false;
        info!("Simulated hardware released, all outputs low");
    }

    fn write_pin(&self, pin: u8, high: bool) -> Result<(), HardwareError> {
        let mut s = self.state.lock();
        s.check_write()?;
        s.outputs.insert(pin, high);
        Ok(())
    }

    fn read_pin(&self, pin: u8) -> Result<bool, HardwareError> {
        let s = self.state.lock();
        s.check_read()?;
        if let Some(c) = s.comparators.get(&pin) {
            let (duty, range) = s.pwm.get(&c.reference).copied().unwrap_or((0, 1));
            let pct = f64::from(duty) * 100.0 / f64::from(range.max(1));
            return Ok(pct >= c.trip_pct);
        }
        Ok(s.inputs.get(&pin).copied().unwrap_or(false))
    }

    fn set_pwm(&self, pin: u8, duty: u16, range: u16) -> Result<(), HardwareError> {
        let mut s = self.state.lock();
        s.check_write()?;
        s.pwm.insert(pin, (duty.min(range), range));
        Ok(())
    }

    fn read_sysfs(&self, path: &Path) -> Result<String, HardwareError> {
        let s = self.state.lock();
        s.check_read()?;
        s.files.get(path).cloned().ok_or_else(|| {
            debug!("Simulated sysfs: no file {}", path.display());
            HardwareError::DeviceNotFound
        })
    }

    fn i2c_read(&self, addr: u8, _command: u8, buf: &mut [u8]) -> Result<(), HardwareError> {
        let s = self.state.lock();
        s.check_read()?;
        let reply = s.i2c.get(&addr).ok_or(HardwareError::DeviceNotFound)?;
        if reply.len() < buf.len() {
            return Err(HardwareError::ReadFailed);
        }
        buf.copy_from_slice(&reply[..buf.len()]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operations_need_acquire() {
        let hw = SimulatedHardware::new();
        assert_eq!(hw.write_pin(1, true), Err(HardwareError::NotAcquired));
        assert_eq!(hw.read_pin(1), Err(HardwareError::NotAcquired));
        hw.acquire().unwrap();
        hw.write_pin(1, true).unwrap();
        assert_eq!(hw.pin_level(1), Some(true));
    }

    #[test]
    fn release_drives_outputs_low() {
        let hw = SimulatedHardware::new();
        hw.acquire().unwrap();
        hw.write_pin(3, true).unwrap();
        hw.set_pwm(4, 120, 200).unwrap();
        hw.release();
        assert_eq!(hw.pin_level(3), Some(false));
        assert_eq!(hw.pwm(4), Some((0, 200)));
        assert!(!hw.is_acquired());
    }

    #[test]
    fn comparator_follows_reference() {
        let hw = SimulatedHardware::new();
        hw.acquire().unwrap();
        hw.set_comparator(5, 12, 40.0);
        hw.set_pwm(12, 70, 200).unwrap();
        assert_eq!(hw.read_pin(5), Ok(false));
        hw.set_pwm(12, 80, 200).unwrap();
        assert_eq!(hw.read_pin(5), Ok(true));
    }

    #[test]
    fn scripted_reads_and_failures() {
        let hw = SimulatedHardware::new();
        hw.acquire().unwrap();
        hw.set_file("/w1/a", "abc");
        hw.set_i2c_response(0x23, &[0x01, 0x02]);
        assert_eq!(hw.read_sysfs(Path::new("/w1/a")).unwrap(), "abc");
        assert_eq!(hw.read_sysfs(Path::new("/w1/b")), Err(HardwareError::DeviceNotFound));
        let mut buf = [0u8; 2];
        hw.i2c_read(0x23, 0x20, &mut buf).unwrap();
        assert_eq!(buf, [1, 2]);

        hw.fail_reads(true);
        assert_eq!(hw.i2c_read(0x23, 0x20, &mut buf), Err(HardwareError::ReadFailed));
        hw.fail_writes(true);
        assert_eq!(hw.write_pin(1, true), Err(HardwareError::WriteFailed));
    }
}
