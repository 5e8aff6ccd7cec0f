//! Integration tests for the consumer-side client driving a configured
//! task set over the channel pair.

use std::sync::Arc;
use std::time::{Duration, Instant};

use greenhouse::app::builder::build_manager;
use greenhouse::app::commands::{CommandResponse, SprinklerCommand, TaskCommand};
use greenhouse::config::{SprinklerConfig, SystemConfig, TaskConfig, TaskKind};
use greenhouse::control::ValveMode;
use greenhouse::error::{CommandError, Error};
use greenhouse::rpc::client::AcquisitionClient;

use crate::mock_hw::{HwCall, MockHardware};

const T: Duration = Duration::from_secs(5);

fn sprinkler_config() -> SystemConfig {
    SystemConfig {
        simulate_hardware: false,
        control_poll_ms: 10,
        tasks: vec![TaskConfig {
            name: "Sprinkler".into(),
            period_secs: 0.05,
            master: None,
            seed: 0,
            kind: TaskKind::Sprinkler(SprinklerConfig {
                valve_pins: vec![5, 6],
                valve_names: vec!["Beds".into(), "Pots".into()],
                schedule: Vec::new(),
            }),
        }],
        ..SystemConfig::default()
    }
}

fn client(hw: &Arc<MockHardware>) -> AcquisitionClient {
    let cfg = sprinkler_config();
    let hw = hw.clone();
    AcquisitionClient::spawn(100, Duration::from_millis(10), move || build_manager(&cfg, hw)).unwrap()
}

fn wait_for(mut pred: impl FnMut() -> bool) {
    let deadline = Instant::now() + T;
    while !pred() {
        assert!(Instant::now() < deadline, "condition not met within {T:?}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

#[test]
fn valve_override_from_the_wire() {
    let hw = Arc::new(MockHardware::new());
    let mut c = client(&hw);

    let map = c.describe(T).unwrap();
    assert_eq!(map["Sprinkler"].keys().collect::<Vec<_>>(), ["Beds", "Pots"]);
    c.start(T).unwrap();

    let cmd = TaskCommand::from_wire("SPRINK:MODE", "1,ON").unwrap();
    assert_eq!(c.command("Sprinkler", cmd, T).unwrap(), CommandResponse::None);
    wait_for(|| hw.pin(6) == Some(true));
    assert_eq!(hw.pin(5), Some(false));

    let modes = c.command("Sprinkler", TaskCommand::Sprinkler(SprinklerCommand::GetModes), T).unwrap();
    assert_eq!(modes, CommandResponse::ValveModes(vec![ValveMode::Off, ValveMode::On]));

    // The override shows up on the data channel as a 100 % valve position.
    let data = c.data();
    let deadline = Instant::now() + T;
    loop {
        let s = data.recv_timeout(T).unwrap();
        if s.parameter == "Pots" && s.value == 100.0 {
            break;
        }
        assert!(Instant::now() < deadline);
    }

    c.terminate();
    assert_eq!(hw.pin(6), Some(false));
    assert_eq!(hw.calls().last(), Some(&HwCall::Release));
}

#[test]
fn bad_valve_and_unknown_task() {
    let hw = Arc::new(MockHardware::new());
    let mut c = client(&hw);
    c.start(T).unwrap();

    let bad = TaskCommand::Sprinkler(SprinklerCommand::SetMode {
        valve: 5,
        mode: ValveMode::On,
    });
    assert!(matches!(
        c.command("Sprinkler", bad.clone(), T),
        Err(Error::Command(CommandError::InvalidValve(5)))
    ));
    assert!(matches!(
        c.command("Nobody", bad, T),
        Err(Error::Command(CommandError::UnknownTask(_)))
    ));
}
