//! System configuration parameters
//!
//! All tunable parameters for the greenhouse controller: queue sizes,
//! polling intervals, storage policy and the task list.  Loaded from a JSON
//! file through [`ConfigPort`](crate::app::ports::ConfigPort); anything
//! missing from the file takes the default below.

use std::collections::HashSet;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::control::{Mode, boost_minutes_valid};
use crate::error::ConfigError;
use crate::schedule::{Schedule, SchedulePeg};

/// Longest task period (one day).
pub const MAX_PERIOD_SECS: f64 = 86_400.0;
/// Longest heater dwell, fan or reset time (one day).
pub const MAX_DWELL_SECS: i64 = 86_400;
/// Longest moisture settle time per sweep step.
pub const MAX_SETTLE_MS: u64 = 10_000;

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Run every sensor as a simulated source against in-memory hardware.
    pub simulate_hardware: bool,
    /// Output that powers the one-wire probes (raised while acquired)
    pub sensor_power_pin: Option<u8>,
    /// I2C bus character device (BH1750)
    pub i2c_bus: PathBuf,
    /// Hardware PWM controller; pins without a channel here get software PWM
    pub pwm_chip: PathBuf,
    pub pwm_channels: Vec<PwmChannel>,

    // --- Queues ---
    /// Common output queue shared by all tasks
    pub task_queue_capacity: usize,
    /// Data channel from the acquisition side to the monitor
    pub data_channel_capacity: usize,
    /// Per-subscriber live stream buffer
    pub live_stream_capacity: usize,

    // --- Timing ---
    /// Acquisition loop pop timeout (milliseconds)
    pub control_poll_ms: u64,
    /// Monitor receive timeout (milliseconds)
    pub monitor_poll_ms: u64,
    /// Maximum wait for the description query (seconds)
    pub describe_timeout_secs: u64,
    /// Stop after this many seconds (`None` = until told to quit)
    pub run_secs: Option<u64>,

    pub storage: StorageConfig,
    pub tasks: Vec<TaskConfig>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            simulate_hardware: true,
            sensor_power_pin: Some(22),
            i2c_bus: PathBuf::from("/dev/i2c-1"),
            pwm_chip: PathBuf::from("/sys/class/pwm/pwmchip0"),
            pwm_channels: vec![PwmChannel { pin: 18, channel: 0 }],

            // Queues
            task_queue_capacity: 20,
            data_channel_capacity: 100,
            live_stream_capacity: 50,

            // Timing
            control_poll_ms: 100,
            monitor_poll_ms: 100,
            describe_timeout_secs: 15,
            run_secs: None,

            storage: StorageConfig::default(),
            tasks: default_tasks(),
        }
    }
}

impl SystemConfig {
    /// Range and consistency checks.  Rejected, never clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_queue_capacity == 0 {
            return Err(ConfigError::ValidationFailed("task_queue_capacity must be > 0"));
        }
        if self.data_channel_capacity == 0 {
            return Err(ConfigError::ValidationFailed("data_channel_capacity must be > 0"));
        }
        if self.live_stream_capacity == 0 {
            return Err(ConfigError::ValidationFailed("live_stream_capacity must be > 0"));
        }
        if self.control_poll_ms == 0 || self.monitor_poll_ms == 0 {
            return Err(ConfigError::ValidationFailed("poll intervals must be > 0"));
        }
        if self.storage.chunk_width_ms <= 0 {
            return Err(ConfigError::ValidationFailed("storage.chunk_width_ms must be > 0"));
        }

        let mut pwm_pins = HashSet::new();
        for c in &self.pwm_channels {
            if !pwm_pins.insert(c.pin) {
                return Err(ConfigError::ValidationFailed("pwm_channels lists a pin twice"));
            }
        }

        let mut names = HashSet::new();
        for task in &self.tasks {
            if task.name.trim().is_empty() {
                return Err(ConfigError::ValidationFailed("task name must not be empty"));
            }
            if !(task.period_secs.is_finite() && task.period_secs > 0.0 && task.period_secs <= MAX_PERIOD_SECS) {
                return Err(ConfigError::ValidationFailed("task period_secs must be in (0, 86400]"));
            }
            if !names.insert(task.name.as_str()) {
                return Err(ConfigError::ValidationFailed("duplicate task name"));
            }
        }
        for task in &self.tasks {
            task.kind.validate(&names)?;
        }
        for task in &self.tasks {
            let Some(master) = &task.master else { continue };
            let Some(m) = self.tasks.iter().find(|t| &t.name == master) else {
                return Err(ConfigError::ValidationFailed("slave names an unknown master"));
            };
            if m.master.is_some() {
                return Err(ConfigError::ValidationFailed("master task is itself a slave"));
            }
        }
        Ok(())
    }
}

/// Time-series store policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one database per parameter
    pub dir: PathBuf,
    /// Longest a written sample may stay uncommitted (seconds)
    pub max_commit_delay_secs: u64,
    /// Compaction window width (milliseconds)
    pub chunk_width_ms: i64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("db"),
            max_commit_delay_secs: 20,
            chunk_width_ms: 600_000, // 10 min
        }
    }
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

/// One periodic task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Source name; also the thread name and the store file prefix.
    pub name: String,
    pub period_secs: f64,
    /// Run as a slave of this task instead of on an own timer.
    #[serde(default)]
    pub master: Option<String>,
    /// Seed for the simulated value generator.
    #[serde(default)]
    pub seed: u64,
    pub kind: TaskKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Random temperature and humidity, always simulated.
    Simulated,
    Ds18b20(Ds18b20Config),
    Dht22(Dht22Config),
    Bh1750(Bh1750Config),
    Moisture(MoistureConfig),
    Heater(HeaterConfig),
    Light(LightConfig),
    Sprinkler(SprinklerConfig),
}

impl TaskKind {
    /// Per-kind range checks.  `tasks` holds every configured task name.
    fn validate(&self, tasks: &HashSet<&str>) -> Result<(), ConfigError> {
        let msg = match self {
            Self::Heater(c) => return c.validate(tasks),
            Self::Light(c) => return c.validate(tasks),
            Self::Ds18b20(c) if c.reset_off_secs > MAX_DWELL_SECS.unsigned_abs() => "ds18b20 reset_off_secs out of range",
            Self::Moisture(c) if c.det_pins.is_empty() => "moisture needs at least one det pin",
            Self::Moisture(c) if c.settle_ms > MAX_SETTLE_MS => "moisture settle_ms out of range",
            Self::Sprinkler(c) if !c.valve_names.is_empty() && c.valve_names.len() != c.valve_pins.len() => {
                "sprinkler valve_names must match valve_pins"
            }
            _ => return Ok(()),
        };
        Err(ConfigError::ValidationFailed(msg))
    }

    /// Sensor kinds are replaced by a simulated source in simulated mode.
    pub fn is_sensor(&self) -> bool {
        matches!(
            self,
            Self::Simulated | Self::Ds18b20(_) | Self::Dht22(_) | Self::Bh1750(_) | Self::Moisture(_)
        )
    }
}

/// One-wire temperature probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ds18b20Config {
    /// Device id under the one-wire bus, e.g. `28-00000c362511`.
    pub addr: String,
    #[serde(default = "default_w1_dir")]
    pub w1_dir: PathBuf,
    /// Sensor supply pin, power-cycled to recover a locked-up bus.
    #[serde(default)]
    pub reset_pin: Option<u8>,
    #[serde(default = "default_reset_off_secs")]
    pub reset_off_secs: u64,
}

/// DHT22 exposed by the kernel IIO driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dht22Config {
    /// e.g. `/sys/bus/iio/devices/iio:device0`
    pub device: PathBuf,
}

/// BH1750 ambient light sensor on I2C.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bh1750Config {
    #[serde(default = "default_bh1750_addr")]
    pub addr: u8,
}

/// Comparator moisture probes against a swept PWM reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoistureConfig {
    pub ref_pin: u8,
    pub det_pins: Vec<u8>,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

/// Thermostat with optional fan.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeaterConfig {
    pub heat_pin: u8,
    pub fan_pin: Option<u8>,
    /// Buffer key of the temperature being controlled.
    pub sensor_source: String,
    pub sensor_parameter: String,
    pub min_on_secs: i64,
    pub min_off_secs: i64,
    pub max_on_secs: i64,
    pub fan_overrun_secs: i64,
    pub fan_prestart_secs: i64,
    /// AUTO target when no schedule peg matches.
    pub default_target: f64,
    /// Demand stays on until the reading reaches `target + hysteresis`.
    pub hysteresis: f64,
    pub boost_target: f64,
    pub boost_minutes: f64,
    pub mode: Mode,
    pub schedule: Vec<SchedulePeg>,
}

impl Default for HeaterConfig {
    fn default() -> Self {
        Self {
            heat_pin: 23,
            fan_pin: None,
            sensor_source: String::new(),
            sensor_parameter: "Temp".into(),
            min_on_secs: 180,
            min_off_secs: 180,
            max_on_secs: 3600,
            fan_overrun_secs: 180,
            fan_prestart_secs: 10,
            default_target: 12.0,
            hysteresis: 0.0,
            boost_target: 20.0,
            boost_minutes: 60.0,
            mode: Mode::Off,
            schedule: Vec::new(),
        }
    }
}

impl HeaterConfig {
    fn validate(&self, tasks: &HashSet<&str>) -> Result<(), ConfigError> {
        if !tasks.contains(self.sensor_source.as_str()) {
            return Err(ConfigError::ValidationFailed("heater sensor_source names an unknown task"));
        }
        let dwell = [
            self.min_on_secs,
            self.min_off_secs,
            self.max_on_secs,
            self.fan_overrun_secs,
            self.fan_prestart_secs,
        ];
        if dwell.iter().any(|s| !(0..=MAX_DWELL_SECS).contains(s)) {
            return Err(ConfigError::ValidationFailed("heater dwell times must be in [0, 86400] s"));
        }
        if self.max_on_secs < self.min_on_secs {
            return Err(ConfigError::ValidationFailed("heater max_on_secs below min_on_secs"));
        }
        if !(self.hysteresis.is_finite() && self.hysteresis >= 0.0) {
            return Err(ConfigError::ValidationFailed("heater hysteresis must be >= 0"));
        }
        if !(self.default_target.is_finite() && self.boost_target.is_finite()) {
            return Err(ConfigError::ValidationFailed("heater targets must be finite"));
        }
        if !boost_minutes_valid(self.boost_minutes) {
            return Err(ConfigError::ValidationFailed("heater boost_minutes out of range"));
        }
        Ok(())
    }
}

/// Grow-light dimmer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub pin: u8,
    pub sensor_source: String,
    pub sensor_parameter: String,
    /// Brightness change per lux of error (%/lx).
    pub gain: f64,
    /// Largest brightness change per heartbeat (%).
    pub max_step: f64,
    /// Duty (%) at 0 % and 100 % brightness.
    pub pwm_min: f64,
    pub pwm_max: f64,
    pub pwm_range: u16,
    pub boost_target: f64,
    pub boost_minutes: f64,
    pub mode: Mode,
    pub schedule: Vec<SchedulePeg>,
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            pin: 18,
            sensor_source: String::new(),
            sensor_parameter: "Light".into(),
            gain: 0.425 / 120.0, // ~120 lx per percent
            max_step: 15.0,
            pwm_min: 0.0,
            pwm_max: 80.0,
            pwm_range: 200,
            boost_target: 100_000.0,
            boost_minutes: 30.0,
            mode: Mode::Auto,
            schedule: default_light_schedule(),
        }
    }
}

impl LightConfig {
    fn validate(&self, tasks: &HashSet<&str>) -> Result<(), ConfigError> {
        if !tasks.contains(self.sensor_source.as_str()) {
            return Err(ConfigError::ValidationFailed("light sensor_source names an unknown task"));
        }
        if !(self.gain.is_finite() && self.max_step.is_finite() && self.max_step > 0.0) {
            return Err(ConfigError::ValidationFailed("light gain and max_step must be finite, max_step > 0"));
        }
        if !(0.0 <= self.pwm_min && self.pwm_min <= self.pwm_max && self.pwm_max <= 100.0) {
            return Err(ConfigError::ValidationFailed("light needs 0 <= pwm_min <= pwm_max <= 100"));
        }
        if self.pwm_range == 0 {
            return Err(ConfigError::ValidationFailed("light pwm_range must be > 0"));
        }
        if !self.boost_target.is_finite() {
            return Err(ConfigError::ValidationFailed("light boost_target must be finite"));
        }
        if !boost_minutes_valid(self.boost_minutes) {
            return Err(ConfigError::ValidationFailed("light boost_minutes out of range"));
        }
        Ok(())
    }
}

/// Irrigation valves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SprinklerConfig {
    pub valve_pins: Vec<u8>,
    /// Parameter names; `1`, `2`, ... when empty.
    #[serde(default)]
    pub valve_names: Vec<String>,
    #[serde(default)]
    pub schedule: Vec<SchedulePeg>,
}

/// A GPIO routed to a hardware PWM channel of `pwm_chip`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PwmChannel {
    pub pin: u8,
    pub channel: u8,
}

fn default_w1_dir() -> PathBuf {
    PathBuf::from("/sys/bus/w1/devices")
}

const fn default_reset_off_secs() -> u64 {
    10
}

const fn default_bh1750_addr() -> u8 {
    0x23
}

const fn default_settle_ms() -> u64 {
    50
}

fn peg(target: f64, h0: u32, m0: u32, h1: u32, m1: u32) -> Option<SchedulePeg> {
    SchedulePeg::new(target, h0, m0, h1, m1).ok()
}

fn default_light_schedule() -> Vec<SchedulePeg> {
    [
        peg(2000.0, 6, 0, 7, 0),
        peg(4000.0, 7, 0, 8, 0),
        peg(5000.0, 8, 0, 18, 0),
        peg(3500.0, 18, 0, 19, 0),
        peg(1000.0, 19, 0, 19, 30),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn default_sprinkler_schedule() -> Vec<SchedulePeg> {
    [peg(0.0, 20, 0, 20, 20), peg(1.0, 19, 15, 19, 35), peg(0.0, 13, 30, 13, 40)]
        .into_iter()
        .flatten()
        .collect()
}

fn task(name: &str, period_secs: f64, master: Option<&str>, kind: TaskKind) -> TaskConfig {
    TaskConfig {
        name: name.into(),
        period_secs,
        master: master.map(Into::into),
        seed: 0,
        kind,
    }
}

fn probe(addr: &str) -> TaskKind {
    TaskKind::Ds18b20(Ds18b20Config {
        addr: addr.into(),
        w1_dir: default_w1_dir(),
        reset_pin: Some(22),
        reset_off_secs: default_reset_off_secs(),
    })
}

/// The reference greenhouse.
fn default_tasks() -> Vec<TaskConfig> {
    let mut tasks = vec![
        task("Probe 1", 4.0, None, probe("28-00000c362511")),
        task("Probe 2", 2.5, None, probe("28-00000c36cbaa")),
        task("Control Box", 3.0, None, probe("28-00000c37dfa4")),
        task(
            "Inside Light Sensor",
            2.0,
            None,
            TaskKind::Bh1750(Bh1750Config { addr: default_bh1750_addr() }),
        ),
        task(
            "DHT1",
            5.0,
            None,
            TaskKind::Dht22(Dht22Config { device: PathBuf::from("/sys/bus/iio/devices/iio:device0") }),
        ),
        task(
            "Moisture",
            10.0,
            None,
            TaskKind::Moisture(MoistureConfig { ref_pin: 12, det_pins: vec![5, 6], settle_ms: default_settle_ms() }),
        ),
        task(
            "Heater",
            10.0,
            Some("Probe 1"),
            TaskKind::Heater(HeaterConfig {
                fan_pin: Some(24),
                sensor_source: "Probe 1".into(),
                ..HeaterConfig::default()
            }),
        ),
        task(
            "Grow Lights",
            2.0,
            Some("Inside Light Sensor"),
            TaskKind::Light(LightConfig { sensor_source: "Inside Light Sensor".into(), ..LightConfig::default() }),
        ),
        task(
            "Sprinkler",
            5.0,
            None,
            TaskKind::Sprinkler(SprinklerConfig {
                valve_pins: vec![25, 8, 7],
                valve_names: Vec::new(),
                schedule: default_sprinkler_schedule(),
            }),
        ),
    ];
    for (seed, t) in (1..).zip(tasks.iter_mut()) {
        t.seed = seed;
    }
    tasks
}

/// Build a [`Schedule`] from configured pegs, dropping any beyond capacity.
pub fn schedule_from(pegs: &[SchedulePeg]) -> Schedule {
    let mut schedule = Schedule::new();
    for p in pegs {
        if schedule.add(*p).is_err() {
            log::warn!("schedule full, ignoring {} remaining pegs", pegs.len() - schedule.pegs().len());
            break;
        }
    }
    schedule
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = SystemConfig::default();
        assert!(c.validate().is_ok());
        assert!(c.task_queue_capacity > 0);
        assert!(c.storage.max_commit_delay_secs > 0);
        assert_eq!(c.storage.chunk_width_ms, 600_000);
    }

    #[test]
    fn serde_roundtrip() {
        let c = SystemConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: SystemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.tasks.len(), c2.tasks.len());
        assert_eq!(c.storage.dir, c2.storage.dir);
        assert!(matches!(c2.tasks[6].kind, TaskKind::Heater(_)));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let c: SystemConfig = serde_json::from_str(r#"{"task_queue_capacity": 5, "tasks": []}"#).unwrap();
        assert_eq!(c.task_queue_capacity, 5);
        assert_eq!(c.data_channel_capacity, 100);
        assert!(c.tasks.is_empty());
    }

    #[test]
    fn task_kind_is_tagged() {
        let json = r#"{"name":"Lamp","period_secs":2,"kind":{"type":"light"}}"#;
        let t: TaskConfig = serde_json::from_str(json).unwrap();
        let TaskKind::Light(l) = t.kind else { panic!("wrong kind") };
        assert_eq!(l.pwm_range, 200);
        assert_eq!(l.schedule.len(), 5);
    }

    #[test]
    fn rejects_zero_capacity() {
        let c = SystemConfig { task_queue_capacity: 0, ..SystemConfig::default() };
        assert!(matches!(c.validate(), Err(ConfigError::ValidationFailed(_))));
    }

    #[test]
    fn rejects_duplicate_names() {
        let mut c = SystemConfig::default();
        c.tasks.push(c.tasks[0].clone());
        assert!(matches!(c.validate(), Err(ConfigError::ValidationFailed("duplicate task name"))));
    }

    #[test]
    fn rejects_unknown_and_nested_masters() {
        let mut c = SystemConfig::default();
        c.tasks[6].master = Some("Nowhere".into());
        assert!(c.validate().is_err());

        let mut c = SystemConfig::default();
        c.tasks[0].master = Some("Heater".into());
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed("master task is itself a slave"))
        ));
    }

    #[test]
    fn default_greenhouse_wires_controllers_as_slaves() {
        let c = SystemConfig::default();
        let heater = c.tasks.iter().find(|t| t.name == "Heater").unwrap();
        assert_eq!(heater.master.as_deref(), Some("Probe 1"));
        let lights = c.tasks.iter().find(|t| t.name == "Grow Lights").unwrap();
        assert_eq!(lights.master.as_deref(), Some("Inside Light Sensor"));
    }

    #[test]
    fn rejects_unbounded_period() {
        let mut c = SystemConfig::default();
        c.tasks[0].period_secs = 1e30;
        assert!(matches!(c.validate(), Err(ConfigError::ValidationFailed(_))));
        c.tasks[0].period_secs = MAX_PERIOD_SECS;
        assert!(c.validate().is_ok());
    }

    fn heater_mut(c: &mut SystemConfig) -> &mut HeaterConfig {
        match &mut c.tasks[6].kind {
            TaskKind::Heater(h) => h,
            _ => panic!("task 6 is not the heater"),
        }
    }

    #[test]
    fn controller_sensor_must_exist() {
        let mut c = SystemConfig::default();
        heater_mut(&mut c).sensor_source = "Probe 9".into();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed("heater sensor_source names an unknown task"))
        ));

        let mut c = SystemConfig::default();
        let TaskKind::Light(l) = &mut c.tasks[7].kind else { panic!("task 7 is not the light") };
        l.sensor_source = String::new();
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed("light sensor_source names an unknown task"))
        ));
    }

    #[test]
    fn rejects_bad_heater_timing() {
        let mut c = SystemConfig::default();
        heater_mut(&mut c).min_on_secs = -1;
        assert!(c.validate().is_err());

        let mut c = SystemConfig::default();
        heater_mut(&mut c).fan_overrun_secs = i64::MAX;
        assert!(c.validate().is_err());

        let mut c = SystemConfig::default();
        heater_mut(&mut c).max_on_secs = 60;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed("heater max_on_secs below min_on_secs"))
        ));
    }

    #[test]
    fn rejects_oversized_boost() {
        let mut c = SystemConfig::default();
        heater_mut(&mut c).boost_minutes = 1e12;
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed("heater boost_minutes out of range"))
        ));

        let mut c = SystemConfig::default();
        let TaskKind::Light(l) = &mut c.tasks[7].kind else { panic!("task 7 is not the light") };
        l.boost_minutes = -1.0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn rejects_mismatched_valve_names_and_pwm_pins() {
        let mut c = SystemConfig::default();
        let TaskKind::Sprinkler(s) = &mut c.tasks[8].kind else { panic!("task 8 is not the sprinkler") };
        s.valve_names = vec!["Beds".into()];
        assert!(c.validate().is_err());

        let mut c = SystemConfig::default();
        c.pwm_channels.push(PwmChannel { pin: 18, channel: 1 });
        assert!(matches!(
            c.validate(),
            Err(ConfigError::ValidationFailed("pwm_channels lists a pin twice"))
        ));
    }
}
