//! Actuator lines and one-wire bus helpers.

pub mod pins;
pub mod w1;
