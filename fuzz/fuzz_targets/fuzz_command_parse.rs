//! Fuzz target: `TaskCommand::from_wire`
//!
//! Splits arbitrary input at the first `|` into key and payload, as the
//! operator console does, and asserts the parser never panics.  A schedule
//! peg that parses must parse again from its own wire form.
//!
//! cargo fuzz run fuzz_command_parse

#![no_main]

use greenhouse::app::commands::{ControllerCommand, SprinklerCommand, TaskCommand};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else { return };
    let (key, payload) = text.split_once('|').unwrap_or((text, ""));

    let peg = match TaskCommand::from_wire(key, payload) {
        Ok(
            TaskCommand::Thermostat(ControllerCommand::AddPeg(p))
            | TaskCommand::Illumination(ControllerCommand::AddPeg(p))
            | TaskCommand::Sprinkler(SprinklerCommand::AddPeg(p)),
        ) => p,
        _ => return,
    };
    let again = TaskCommand::from_wire("HEATER:SCHED_ADD", &peg.to_string());
    assert!(again.is_ok(), "peg {peg} does not re-parse");
});
