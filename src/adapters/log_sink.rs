//! Log-based sample sink adapter.
//!
//! Implements [`SampleSink`] by writing every stored sample to the logger
//! at `debug` level.  Run with `RUST_LOG=greenhouse=debug` to watch the
//! live stream on the console.

use log::debug;

use crate::app::events::Sample;
use crate::app::ports::SampleSink;

/// Adapter that logs every [`Sample`].
pub struct LogSampleSink;

impl LogSampleSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LogSampleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl SampleSink for LogSampleSink {
    fn emit(&mut self, sample: &Sample) {
        debug!(
            "SAMPLE | {} | {} | {} | {:.3}",
            sample.source,
            sample.parameter,
            sample.timestamp.format("%H:%M:%S%.3f"),
            sample.value
        );
    }
}
