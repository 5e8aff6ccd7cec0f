//! Fuzz target: `parse_w1_slave`
//!
//! The one-wire reply comes straight from a sysfs file and may be
//! truncated or garbled by a flaky bus.  The parser must never panic and
//! must never report a value outside what a 64-bit millidegree count can
//! express.
//!
//! cargo fuzz run fuzz_w1_parse

#![no_main]

use greenhouse::drivers::w1::parse_w1_slave;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);
    if let Ok(celsius) = parse_w1_slave(&text) {
        assert!(celsius.is_finite());
    }
});
