//! Sensor drivers.
//!
//! Each driver is a [`PeriodicTask`](crate::task::PeriodicTask) that reads
//! its device through the shared [`HardwarePort`](crate::app::ports::HardwarePort)
//! and emits one sample per parameter per heartbeat.  A failed read skips
//! the affected parameter for that cycle and logs a warning.
//!
//! In simulated mode the task builder swaps every driver for a
//! [`SimulatedSensor`](simulated::SimulatedSensor) over the same
//! descriptions, so the consumer side sees an identical parameter set.

pub mod bh1750;
pub mod dht22;
pub mod ds18b20;
pub mod moisture;
pub mod simulated;

use crate::params::{Category, ParameterDescription};

pub(crate) fn temperature_description() -> ParameterDescription {
    ParameterDescription::float("Temp", "Temp", Category::Temperature, -10.0, 40.0, "\u{b0}C")
}

pub(crate) fn climate_descriptions() -> Vec<ParameterDescription> {
    vec![
        temperature_description(),
        ParameterDescription::float("Humid", "Humidity", Category::Humidity, 0.0, 100.0, "%"),
    ]
}
