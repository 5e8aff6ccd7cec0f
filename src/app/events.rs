//! Outbound sample events.
//!
//! Tasks emit one [`Sample`] per parameter per heartbeat onto the common
//! output queue.  The acquisition loop feeds it into the shared buffer and
//! forwards it across the data channel; on the consumer side the monitor
//! hands it to the store registry and any [`SampleSink`](super::ports::SampleSink).

use chrono::{DateTime, Local};
use serde::Serialize;

/// One reading (or controller output) of one parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub source: String,
    pub parameter: String,
    /// Heartbeat trigger time, not the time the value was written.
    pub timestamp: DateTime<Local>,
    pub value: f64,
}

impl Sample {
    pub fn new(source: &str, parameter: &str, timestamp: DateTime<Local>, value: f64) -> Self {
        Self {
            source: source.to_owned(),
            parameter: parameter.to_owned(),
            timestamp,
            value,
        }
    }

    /// Epoch milliseconds, the key used by the store.
    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }
}
