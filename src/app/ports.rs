//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ tasks / acquisition loop / monitor
//! ```
//!
//! Driven adapters (hardware backends, sample sinks, config files)
//! implement these traits.  Tasks hold the hardware handle as
//! `Arc<dyn HardwarePort>`, so the domain core never touches sysfs or GPIO
//! directly and tests swap in a recording mock.

use std::path::Path;

use crate::config::SystemConfig;
use crate::error::{ConfigError, HardwareError};

use super::events::Sample;

// ───────────────────────────────────────────────────────────────
// Hardware port (driven adapter: domain ↔ GPIO / sysfs / I2C)
// ───────────────────────────────────────────────────────────────

/// The shared hardware handle.
///
/// Owned by the task manager, which calls [`acquire`](Self::acquire) before
/// any task starts and [`release`](Self::release) after every task has been
/// joined.  Tasks only borrow it.  Implementations use interior mutability
/// because every task thread calls in concurrently.
pub trait HardwarePort: Send + Sync {
    /// Bring the hardware up (export pins, power sensors).
    fn acquire(&self) -> Result<(), HardwareError>;

    /// Return every output to a safe state and give the hardware back.
    fn release(&self);

    /// Drive a digital output.
    fn write_pin(&self, pin: u8, high: bool) -> Result<(), HardwareError>;

    /// Sample a digital input.
    fn read_pin(&self, pin: u8) -> Result<bool, HardwareError>;

    /// Set a PWM duty of `duty` out of `range` steps.
    fn set_pwm(&self, pin: u8, duty: u16, range: u16) -> Result<(), HardwareError>;

    /// Read a kernel-exported attribute file (one-wire, IIO).
    fn read_sysfs(&self, path: &Path) -> Result<String, HardwareError>;

    /// Write `command` to the I2C device at `addr` and read back `buf.len()` bytes.
    fn i2c_read(&self, addr: u8, command: u8, buf: &mut [u8]) -> Result<(), HardwareError>;
}

// ───────────────────────────────────────────────────────────────
// Sample sink port (driven adapter: consumer → live view / logging)
// ───────────────────────────────────────────────────────────────

/// The monitor forwards every stored sample through this port.  Adapters
/// decide where it goes (log, live stream subscribers).
pub trait SampleSink: Send {
    fn emit(&mut self, sample: &Sample);
}

// ───────────────────────────────────────────────────────────────
// Configuration port (driven adapter: domain ↔ persistent config)
// ───────────────────────────────────────────────────────────────

/// Loads and persists system configuration.
///
/// Implementations MUST validate config values before persisting.
/// Invalid values are rejected with [`ConfigError::ValidationFailed`],
/// never silently clamped.
pub trait ConfigPort {
    /// Load configuration.  [`ConfigError::NotFound`] if none is stored.
    fn load(&self) -> Result<SystemConfig, ConfigError>;

    /// Validate and persist configuration.
    fn save(&self, config: &SystemConfig) -> Result<(), ConfigError>;

    /// Where the configuration lives, for log messages.
    fn location(&self) -> &Path;
}
