//! Configuration → tasks.
//!
//! Turns a [`SystemConfig`] into a populated [`TaskManager`] over the
//! chosen hardware backend.  In simulated mode every sensor kind becomes a
//! [`SimulatedSensor`] over the real driver's parameter descriptions, so
//! controllers and the consumer side see exactly the same parameters as on
//! the board; actuators keep their real controller logic and drive the
//! in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::adapters::sim::SimulatedHardware;
use crate::adapters::sysfs::{DEFAULT_GPIO_ROOT, SysfsHardware};
use crate::app::ports::HardwarePort;
use crate::config::{SystemConfig, TaskConfig, TaskKind};
use crate::control::illumination::Illumination;
use crate::control::sprinkler::Sprinkler;
use crate::control::thermostat::Thermostat;
use crate::error::{ConfigError, TaskError};
use crate::sensors::bh1750::Bh1750;
use crate::sensors::dht22::Dht22;
use crate::sensors::ds18b20::Ds18b20;
use crate::sensors::moisture::MoistureSensor;
use crate::sensors::simulated::SimulatedSensor;
use crate::task::manager::TaskManager;
use crate::task::{PeriodicTask, TaskOptions};

/// The hardware backend selected by `simulate_hardware`.
pub fn hardware_for(cfg: &SystemConfig) -> Arc<dyn HardwarePort> {
    if cfg.simulate_hardware {
        Arc::new(SimulatedHardware::new())
    } else {
        Arc::new(
            SysfsHardware::new(DEFAULT_GPIO_ROOT, cfg.sensor_power_pin)
                .with_i2c_bus(&cfg.i2c_bus)
                .with_pwm(&cfg.pwm_chip, &cfg.pwm_channels),
        )
    }
}

/// Construct the task for one config entry.
pub fn build_task(cfg: &TaskConfig, simulate: bool) -> Box<dyn PeriodicTask> {
    let task: Box<dyn PeriodicTask> = match &cfg.kind {
        TaskKind::Simulated => Box::new(SimulatedSensor::climate(cfg.seed)),
        TaskKind::Ds18b20(c) => Box::new(Ds18b20::new(c)),
        TaskKind::Dht22(c) => Box::new(Dht22::new(c)),
        TaskKind::Bh1750(c) => Box::new(Bh1750::new(c)),
        TaskKind::Moisture(c) => Box::new(MoistureSensor::new(c)),
        TaskKind::Heater(c) => Box::new(Thermostat::new(c.clone())),
        TaskKind::Light(c) => Box::new(Illumination::new(c.clone())),
        TaskKind::Sprinkler(c) => Box::new(Sprinkler::new(c)),
    };
    if simulate && cfg.kind.is_sensor() {
        Box::new(SimulatedSensor::new(task.descriptions(), cfg.seed))
    } else {
        task
    }
}

pub fn options_for(cfg: &TaskConfig) -> Result<TaskOptions, TaskError> {
    let period = Duration::try_from_secs_f64(cfg.period_secs)
        .map_err(|_| ConfigError::ValidationFailed("task period_secs not representable"))?;
    let options = TaskOptions::every(period);
    Ok(match &cfg.master {
        Some(master) => options.slave_of(master),
        None => options,
    })
}

/// A manager holding every configured task, not yet started.  The config
/// is validated first.
pub fn build_manager(cfg: &SystemConfig, hw: Arc<dyn HardwarePort>) -> Result<TaskManager, TaskError> {
    cfg.validate()?;
    let mut manager = TaskManager::new(hw, cfg.task_queue_capacity);
    for t in &cfg.tasks {
        manager.add(&t.name, build_task(t, cfg.simulate_hardware), options_for(t)?)?;
    }
    info!(
        "Built {} tasks ({})",
        cfg.tasks.len(),
        if cfg.simulate_hardware { "simulated hardware" } else { "sysfs hardware" }
    );
    Ok(manager)
}
