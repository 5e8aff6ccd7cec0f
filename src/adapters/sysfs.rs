//! Linux sysfs hardware backend.
//!
//! One-wire and IIO sensors are plain attribute files under `/sys`, and
//! GPIO lines go through the legacy `/sys/class/gpio` interface.  A PWM pin
//! routed to a channel of the configured `/sys/class/pwm` chip is driven in
//! hardware; any other PWM pin gets a software PWM thread toggling its GPIO
//! value.  I2C goes through the `/dev/i2c-N` character device.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use i2cdev::core::I2CDevice;
use i2cdev::linux::LinuxI2CDevice;
use log::{debug, info, warn};
use parking_lot::Mutex;

use crate::app::ports::HardwarePort;
use crate::config::PwmChannel;
use crate::error::HardwareError;
use crate::task::spawn::spawn_named;

pub const DEFAULT_GPIO_ROOT: &str = "/sys/class/gpio";
pub const DEFAULT_I2C_BUS: &str = "/dev/i2c-1";

/// Hardware PWM period (1 kHz).
const PWM_PERIOD_NS: u64 = 1_000_000;
/// Software PWM period (100 Hz).
const SOFT_PWM_PERIOD: Duration = Duration::from_millis(10);
const SOFT_PWM_STACK_KB: usize = 64;
const PPM: u32 = 1_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    In,
    Out,
}

/// A running software PWM line.
struct SoftPwm {
    /// On-time per period in parts per million.
    ppm: Arc<AtomicU32>,
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl SoftPwm {
    fn spawn(pin: u8, value: PathBuf, ppm: u32) -> Result<Self, HardwareError> {
        let ppm = Arc::new(AtomicU32::new(ppm));
        let stop = Arc::new(AtomicBool::new(false));
        let (p, s) = (ppm.clone(), stop.clone());
        let handle = spawn_named(&format!("pwm{pin}"), SOFT_PWM_STACK_KB, move || toggle(&value, &p, &s))
            .map_err(|e| {
                warn!("GPIO {pin}: software PWM thread failed: {e}");
                HardwareError::WriteFailed
            })?;
        debug!("GPIO {pin}: software PWM started");
        Ok(Self { ppm, stop, handle })
    }

    /// Stop the thread and wait for its last write.
    fn halt(self) {
        self.stop.store(true, Ordering::Release);
        if self.handle.join().is_err() {
            warn!("Software PWM thread panicked");
        }
    }
}

fn toggle(value: &Path, ppm: &AtomicU32, stop: &AtomicBool) {
    while !stop.load(Ordering::Acquire) {
        let on = SOFT_PWM_PERIOD * ppm.load(Ordering::Relaxed) / PPM;
        for (level, span) in [("1", on), ("0", SOFT_PWM_PERIOD.saturating_sub(on))] {
            if span.is_zero() {
                continue;
            }
            if let Err(e) = fs::write(value, level) {
                warn!("{}: software PWM stopped: {e}", value.display());
                return;
            }
            thread::sleep(span);
        }
    }
}

fn write_attr(dir: &Path, name: &str, value: u64) -> Result<(), HardwareError> {
    fs::write(dir.join(name), value.to_string()).map_err(|e| {
        warn!("{}/{name}: write failed: {e}", dir.display());
        HardwareError::WriteFailed
    })
}

pub struct SysfsHardware {
    gpio_root: PathBuf,
    power_pin: Option<u8>,
    i2c_bus: PathBuf,
    pwm_chip: PathBuf,
    /// GPIO → hardware PWM channel.
    pwm_channels: HashMap<u8, u8>,
    acquired: AtomicBool,
    lines: Mutex<HashMap<u8, Direction>>,
    /// Hardware channels exported and enabled so far.
    pwm_enabled: Mutex<HashSet<u8>>,
    soft: Mutex<HashMap<u8, SoftPwm>>,
    /// Open I2C handles by slave address.
    i2c: Mutex<HashMap<u8, LinuxI2CDevice>>,
}

impl SysfsHardware {
    pub fn new(gpio_root: impl Into<PathBuf>, power_pin: Option<u8>) -> Self {
        Self {
            gpio_root: gpio_root.into(),
            power_pin,
            i2c_bus: PathBuf::from(DEFAULT_I2C_BUS),
            pwm_chip: PathBuf::new(),
            pwm_channels: HashMap::new(),
            acquired: AtomicBool::new(false),
            lines: Mutex::new(HashMap::new()),
            pwm_enabled: Mutex::new(HashSet::new()),
            soft: Mutex::new(HashMap::new()),
            i2c: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn with_i2c_bus(mut self, bus: impl Into<PathBuf>) -> Self {
        self.i2c_bus = bus.into();
        self
    }

    /// Route `channels` to hardware PWM on `chip`.
    #[must_use]
    pub fn with_pwm(mut self, chip: impl Into<PathBuf>, channels: &[PwmChannel]) -> Self {
        self.pwm_chip = chip.into();
        self.pwm_channels = channels.iter().map(|c| (c.pin, c.channel)).collect();
        self
    }

    fn check(&self) -> Result<(), HardwareError> {
        if self.acquired.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(HardwareError::NotAcquired)
        }
    }

    fn line_dir(&self, pin: u8) -> PathBuf {
        self.gpio_root.join(format!("gpio{pin}"))
    }

    /// Export `pin` and set its direction once.
    fn configure(&self, pin: u8, dir: Direction) -> Result<(), HardwareError> {
        let mut lines = self.lines.lock();
        if lines.get(&pin) == Some(&dir) {
            return Ok(());
        }
        if !self.line_dir(pin).exists() {
            fs::write(self.gpio_root.join("export"), pin.to_string()).map_err(|e| {
                warn!("GPIO {pin}: export failed: {e}");
                HardwareError::DeviceNotFound
            })?;
        }
        let dir_str = if dir == Direction::Out { "out" } else { "in" };
        fs::write(self.line_dir(pin).join("direction"), dir_str).map_err(|e| {
            warn!("GPIO {pin}: direction failed: {e}");
            HardwareError::WriteFailed
        })?;
        debug!("GPIO {pin}: configured {dir_str}");
        lines.insert(pin, dir);
        Ok(())
    }

    fn write_value(&self, pin: u8, high: bool) -> Result<(), HardwareError> {
        fs::write(self.line_dir(pin).join("value"), if high { "1" } else { "0" })
            .map_err(|_| HardwareError::WriteFailed)
    }

    fn channel_dir(&self, channel: u8) -> PathBuf {
        self.pwm_chip.join(format!("pwm{channel}"))
    }

    fn hardware_pwm(&self, pin: u8, channel: u8, duty: u16, range: u16) -> Result<(), HardwareError> {
        let dir = self.channel_dir(channel);
        let mut enabled = self.pwm_enabled.lock();
        if !enabled.contains(&channel) {
            if !dir.exists() {
                fs::write(self.pwm_chip.join("export"), channel.to_string()).map_err(|e| {
                    warn!("PWM channel {channel} (GPIO {pin}): export failed: {e}");
                    HardwareError::DeviceNotFound
                })?;
            }
            // Duty must never exceed the period, so zero it first.
            write_attr(&dir, "duty_cycle", 0)?;
            write_attr(&dir, "period", PWM_PERIOD_NS)?;
            write_attr(&dir, "enable", 1)?;
            info!("GPIO {pin}: hardware PWM on {}", dir.display());
            enabled.insert(channel);
        }
        let duty_ns = PWM_PERIOD_NS * u64::from(duty.min(range)) / u64::from(range);
        write_attr(&dir, "duty_cycle", duty_ns)
    }

    fn software_pwm(&self, pin: u8, duty: u16, range: u16) -> Result<(), HardwareError> {
        self.configure(pin, Direction::Out)?;
        let mut soft = self.soft.lock();
        if duty == 0 || duty >= range {
            if let Some(p) = soft.remove(&pin) {
                p.halt();
            }
            return self.write_value(pin, duty > 0);
        }
        let ppm = (u64::from(duty) * u64::from(PPM) / u64::from(range)) as u32;
        if let Some(p) = soft.get(&pin) {
            p.ppm.store(ppm, Ordering::Relaxed);
            return Ok(());
        }
        let p = SoftPwm::spawn(pin, self.line_dir(pin).join("value"), ppm)?;
        soft.insert(pin, p);
        Ok(())
    }

    fn halt_soft_pwm(&self) {
        for (_, p) in self.soft.lock().drain() {
            p.halt();
        }
    }
}

impl HardwarePort for SysfsHardware {
    fn acquire(&self) -> Result<(), HardwareError> {
        self.acquired.store(true, Ordering::Release);
        if let Some(pin) = self.power_pin {
            if let Err(e) = self.configure(pin, Direction::Out).and_then(|()| self.write_value(pin, true)) {
                self.acquired.store(false, Ordering::Release);
                return Err(e);
            }
            info!("Sensor power on (GPIO {pin})");
        }
        info!("Sysfs hardware acquired ({})", self.gpio_root.display());
        Ok(())
    }

    fn release(&self) {
        self.halt_soft_pwm();
        for channel in self.pwm_enabled.lock().drain() {
            let dir = self.channel_dir(channel);
            if write_attr(&dir, "duty_cycle", 0).and_then(|()| write_attr(&dir, "enable", 0)).is_err() {
                warn!("PWM channel {channel}: failed to disable on release");
            }
        }
        let outputs: Vec<u8> = self
            .lines
            .lock()
            .iter()
            .filter(|(_, d)| **d == Direction::Out)
            .map(|(p, _)| *p)
            .collect();
        for pin in outputs {
            if let Err(e) = self.write_value(pin, false) {
                warn!("GPIO {pin}: failed to drive low on release: {e}");
            }
        }
        self.i2c.lock().clear();
        self.acquired.store(false, Ordering::Release);
        info!("Sysfs hardware released");
    }

    fn write_pin(&self, pin: u8, high: bool) -> Result<(), HardwareError> {
        self.check()?;
        self.configure(pin, Direction::Out)?;
        self.write_value(pin, high)
    }

    fn read_pin(&self, pin: u8) -> Result<bool, HardwareError> {
        self.check()?;
        self.configure(pin, Direction::In)?;
        let raw = fs::read_to_string(self.line_dir(pin).join("value")).map_err(|_| HardwareError::ReadFailed)?;
        match raw.trim() {
            "1" => Ok(true),
            "0" => Ok(false),
            _ => Err(HardwareError::ReadFailed),
        }
    }

    fn set_pwm(&self, pin: u8, duty: u16, range: u16) -> Result<(), HardwareError> {
        self.check()?;
        let range = range.max(1);
        match self.pwm_channels.get(&pin) {
            Some(&channel) => self.hardware_pwm(pin, channel, duty, range),
            None => self.software_pwm(pin, duty, range),
        }
    }

    fn read_sysfs(&self, path: &Path) -> Result<String, HardwareError> {
        self.check()?;
        fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => HardwareError::DeviceNotFound,
            _ => HardwareError::ReadFailed,
        })
    }

    fn i2c_read(&self, addr: u8, command: u8, buf: &mut [u8]) -> Result<(), HardwareError> {
        self.check()?;
        let mut devices = self.i2c.lock();
        let dev = match devices.entry(addr) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let dev = LinuxI2CDevice::new(&self.i2c_bus, u16::from(addr)).map_err(|err| {
                    warn!("I2C {} @0x{addr:02x}: open failed: {err}", self.i2c_bus.display());
                    HardwareError::DeviceNotFound
                })?;
                e.insert(dev)
            }
        };
        let result = match dev.write(&[command]) {
            Ok(()) => dev.read(buf),
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            debug!("I2C @0x{addr:02x}: transfer failed: {e}");
            // Reopen on the next attempt.
            devices.remove(&addr);
            return Err(HardwareError::ReadFailed);
        }
        Ok(())
    }
}

impl Drop for SysfsHardware {
    fn drop(&mut self) {
        self.halt_soft_pwm();
    }
}
