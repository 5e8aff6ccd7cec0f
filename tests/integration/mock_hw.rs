//! Mock hardware adapter for integration tests.
//!
//! Records every port call so tests can assert on the full command
//! history without touching real GPIO, sysfs or I2C.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use greenhouse::app::ports::HardwarePort;
use greenhouse::error::HardwareError;
use parking_lot::Mutex;

// ── Call record ───────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum HwCall {
    Acquire,
    Release,
    WritePin { pin: u8, high: bool },
    SetPwm { pin: u8, duty: u16, range: u16 },
    ReadSysfs(PathBuf),
}

// ── MockHardware ──────────────────────────────────────────────

#[derive(Default)]
pub struct MockHardware {
    calls: Mutex<Vec<HwCall>>,
    files: Mutex<HashMap<PathBuf, String>>,
}

#[allow(dead_code)]
impl MockHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_file(&self, path: impl Into<PathBuf>, contents: &str) {
        self.files.lock().insert(path.into(), contents.to_owned());
    }

    pub fn calls(&self) -> Vec<HwCall> {
        self.calls.lock().clone()
    }

    /// Last level written to `pin`, if any.
    pub fn pin(&self, pin: u8) -> Option<bool> {
        self.calls.lock().iter().rev().find_map(|c| match c {
            HwCall::WritePin { pin: p, high } if *p == pin => Some(*high),
            _ => None,
        })
    }

    pub fn count(&self, call: &HwCall) -> usize {
        self.calls.lock().iter().filter(|c| *c == call).count()
    }
}

impl HardwarePort for MockHardware {
    fn acquire(&self) -> Result<(), HardwareError> {
        self.calls.lock().push(HwCall::Acquire);
        Ok(())
    }

    fn release(&self) {
        self.calls.lock().push(HwCall::Release);
    }

    fn write_pin(&self, pin: u8, high: bool) -> Result<(), HardwareError> {
        self.calls.lock().push(HwCall::WritePin { pin, high });
        Ok(())
    }

    fn read_pin(&self, _pin: u8) -> Result<bool, HardwareError> {
        Ok(false)
    }

    fn set_pwm(&self, pin: u8, duty: u16, range: u16) -> Result<(), HardwareError> {
        self.calls.lock().push(HwCall::SetPwm { pin, duty, range });
        Ok(())
    }

    fn read_sysfs(&self, path: &Path) -> Result<String, HardwareError> {
        self.calls.lock().push(HwCall::ReadSysfs(path.to_owned()));
        self.files.lock().get(path).cloned().ok_or(HardwareError::DeviceNotFound)
    }

    fn i2c_read(&self, _addr: u8, _command: u8, _buf: &mut [u8]) -> Result<(), HardwareError> {
        Err(HardwareError::Unsupported)
    }
}
