//! Greenhouse controller library.
//!
//! Periodic sensor and controller tasks on one side of a channel pair, a
//! monitor that persists every sample into per-parameter SQLite stores on
//! the other.  Everything is exposed for the binary, the integration tests
//! and the fuzz targets.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod buffer;
pub mod config;
pub mod control;
pub mod drivers;
pub mod error;
pub mod monitor;
pub mod params;
pub mod rpc;
pub mod safety;
pub mod schedule;
pub mod sensors;
pub mod storage;
pub mod task;
