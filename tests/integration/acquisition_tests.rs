//! Integration tests for the tasks → acquisition loop → data channel
//! pipeline, driving real sensor and controller tasks against the
//! recording mock hardware.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use greenhouse::app::commands::ControlRequest;
use greenhouse::app::events::Sample;
use greenhouse::app::service::AcquisitionService;
use greenhouse::config::{Ds18b20Config, HeaterConfig};
use greenhouse::control::Mode;
use greenhouse::control::thermostat::Thermostat;
use greenhouse::params::{Category, ParameterDescription};
use greenhouse::rpc::channels::{ConsumerEndpoints, ControlEnvelope, link};
use greenhouse::sensors::ds18b20::Ds18b20;
use greenhouse::task::manager::TaskManager;
use greenhouse::task::{PeriodicTask, TaskContext, TaskOptions};

use crate::mock_hw::{HwCall, MockHardware};

const HEAT_PIN: u8 = 23;
const W1: &str = "/w1/28-000001/w1_slave";

fn w1_reply(milli: i64) -> String {
    format!("72 01 4b 46 7f ff 0e 10 57 : crc=57 YES\n72 01 4b 46 7f ff 0e 10 57 t={milli}\n")
}

fn start(svc: &mut AcquisitionService, con: &ConsumerEndpoints) {
    con.control_tx
        .send(ControlEnvelope {
            id: 1,
            request: ControlRequest::Start,
        })
        .unwrap();
    svc.step();
}

/// Step the loop until `pred` holds for a received sample, or panic.
fn step_until(svc: &mut AcquisitionService, con: &ConsumerEndpoints, mut pred: impl FnMut(&Sample) -> bool) -> Sample {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        svc.step();
        if let Some(s) = con.data_rx.try_iter().find(|s| pred(s)) {
            return s;
        }
    }
    panic!("no matching sample within 5 s");
}

// ── Probe → shared buffer → thermostat → heater pin ──────────

#[test]
fn cold_probe_turns_heater_on_and_terminate_turns_it_off() {
    let hw = Arc::new(MockHardware::new());
    hw.set_file(W1, &w1_reply(15_000));

    let mut m = TaskManager::new(hw.clone(), 20);
    let probe = Ds18b20::new(&Ds18b20Config {
        addr: "28-000001".into(),
        w1_dir: "/w1".into(),
        reset_pin: None,
        reset_off_secs: 0,
    });
    m.add("Probe", Box::new(probe), TaskOptions::every(Duration::from_millis(40))).unwrap();
    let heater = Thermostat::new(HeaterConfig {
        heat_pin: HEAT_PIN,
        sensor_source: "Probe".into(),
        default_target: 20.0,
        mode: Mode::Auto,
        ..HeaterConfig::default()
    });
    m.add("Heater", Box::new(heater), TaskOptions::every(Duration::from_secs(60)).slave_of("Probe"))
        .unwrap();

    let (acq, con) = link(100);
    let mut svc = AcquisitionService::new(m, acq, Duration::from_millis(10));
    start(&mut svc, &con);
    assert_eq!(hw.pin(HEAT_PIN), Some(false), "startup parks the heater off");

    let t = step_until(&mut svc, &con, |s| s.source == "Probe");
    assert!((t.value - 15.0).abs() < 1e-9);

    step_until(&mut svc, &con, |s| s.source == "Heater" && s.parameter == "Heat" && s.value == 100.0);
    assert_eq!(hw.pin(HEAT_PIN), Some(true));
    assert_eq!(
        svc.manager().buffer().unwrap().read_last("Probe", "Temp").map(|(_, v)| v),
        Some(15.0)
    );

    con.control_tx
        .send(ControlEnvelope {
            id: 2,
            request: ControlRequest::Terminate,
        })
        .unwrap();
    svc.run();
    assert_eq!(hw.pin(HEAT_PIN), Some(false));
    assert_eq!(hw.count(&HwCall::Acquire), 1);
    assert_eq!(hw.calls().last(), Some(&HwCall::Release));
}

#[test]
fn missing_probe_file_emits_nothing() {
    let hw = Arc::new(MockHardware::new());
    let mut m = TaskManager::new(hw.clone(), 20);
    let probe = Ds18b20::new(&Ds18b20Config {
        addr: "28-000001".into(),
        w1_dir: "/w1".into(),
        reset_pin: None,
        reset_off_secs: 0,
    });
    m.add("Probe", Box::new(probe), TaskOptions::every(Duration::from_millis(20))).unwrap();
    let (acq, con) = link(100);
    let mut svc = AcquisitionService::new(m, acq, Duration::from_millis(10));
    start(&mut svc, &con);

    let deadline = Instant::now() + Duration::from_millis(200);
    while Instant::now() < deadline {
        svc.step();
    }
    assert!(con.data_rx.is_empty());
    assert!(hw.count(&HwCall::ReadSysfs(W1.into())) >= 2);
}

// ── Slaves run on the master's clock ─────────────────────────

struct Counter;

impl PeriodicTask for Counter {
    fn descriptions(&self) -> Vec<ParameterDescription> {
        vec![ParameterDescription::float("n", "n", Category::Unknown, 0.0, 1.0, "")]
    }

    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext) {
        ctx.emit("n", trigger, 1.0);
    }
}

#[test]
fn slave_heartbeats_track_master() {
    let hw = Arc::new(MockHardware::new());
    let mut m = TaskManager::new(hw, 100);
    m.add("master", Box::new(Counter), TaskOptions::every(Duration::from_millis(30))).unwrap();
    // Its own period would give it no heartbeat at all during the test.
    m.add("slave", Box::new(Counter), TaskOptions::every(Duration::from_secs(3600)).slave_of("master"))
        .unwrap();

    let (acq, con) = link(1000);
    let mut svc = AcquisitionService::new(m, acq, Duration::from_millis(5));
    start(&mut svc, &con);
    let deadline = Instant::now() + Duration::from_millis(400);
    while Instant::now() < deadline {
        svc.step();
    }

    let mut counts: HashMap<String, i64> = HashMap::new();
    for s in con.data_rx.try_iter() {
        *counts.entry(s.source).or_default() += 1;
    }
    let master = counts["master"];
    let slave = counts["slave"];
    assert!(master >= 5, "master only ran {master} times");
    assert!((master - slave).abs() <= 1, "master {master}, slave {slave}");
}
