//! Actuator lines over the shared hardware handle.
//!
//! Controllers never call [`HardwarePort`] directly for their outputs;
//! they hold an [`OutputLine`] (relay, valve, heater) or a [`DimmerLine`]
//! (grow-light PWM) and drive it through the embedded-hal traits.  This
//! keeps the controller logic identical whichever backend sits below.
//!
//! ## Safety contract
//!
//! Lines are dumb.  Every controller drives its outputs low in its
//! `shutdown` hook, and the hardware backend returns every pin to a safe
//! state on release.

use std::sync::Arc;

use embedded_hal::digital::{self, OutputPin};
use embedded_hal::pwm::{self, SetDutyCycle};

use crate::app::ports::HardwarePort;
use crate::error::HardwareError;

/// Digital output (relay, valve, heater contactor).
pub struct OutputLine {
    hw: Arc<dyn HardwarePort>,
    pin: u8,
    high: bool,
}

impl OutputLine {
    pub fn new(hw: Arc<dyn HardwarePort>, pin: u8) -> Self {
        Self { hw, pin, high: false }
    }

    /// Drive the line to `on`.
    pub fn set(&mut self, on: bool) -> Result<(), HardwareError> {
        if on { self.set_high() } else { self.set_low() }
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }
}

impl digital::ErrorType for OutputLine {
    type Error = HardwareError;
}

impl OutputPin for OutputLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.hw.write_pin(self.pin, false)?;
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.hw.write_pin(self.pin, true)?;
        self.high = true;
        Ok(())
    }
}

/// PWM output with `range` discrete steps.
pub struct DimmerLine {
    hw: Arc<dyn HardwarePort>,
    pin: u8,
    range: u16,
    duty: u16,
}

impl DimmerLine {
    pub fn new(hw: Arc<dyn HardwarePort>, pin: u8, range: u16) -> Self {
        Self {
            hw,
            pin,
            range: range.max(1),
            duty: 0,
        }
    }

    /// Last duty written, in steps.
    pub fn duty(&self) -> u16 {
        self.duty
    }
}

impl pwm::ErrorType for DimmerLine {
    type Error = HardwareError;
}

impl SetDutyCycle for DimmerLine {
    fn max_duty_cycle(&self) -> u16 {
        self.range
    }

    fn set_duty_cycle(&mut self, duty: u16) -> Result<(), Self::Error> {
        let duty = duty.min(self.range);
        self.hw.set_pwm(self.pin, duty, self.range)?;
        self.duty = duty;
        Ok(())
    }
}
