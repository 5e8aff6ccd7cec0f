//! Application core.
//!
//! The acquisition side of the greenhouse: the loop that owns the task
//! manager and services the control channel, the typed controller
//! commands, and the task builder that turns configuration into running
//! tasks.  Hardware and sinks are reached only through the **port traits**
//! in [`ports`], so all of it runs against the simulated backend in tests.

pub mod builder;
pub mod commands;
pub mod events;
pub mod ports;
pub mod service;
