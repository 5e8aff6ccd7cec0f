//! Live sample stream.
//!
//! Every subscriber gets its own bounded channel.  A slow subscriber
//! loses samples (at-most-once delivery) and never holds up the monitor;
//! a subscriber whose receiver has been dropped is forgotten.

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, info};

use crate::app::events::Sample;
use crate::app::ports::SampleSink;

pub struct LiveStream {
    capacity: usize,
    subscribers: Vec<Sender<Sample>>,
    dropped: u64,
}

impl LiveStream {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            subscribers: Vec::new(),
            dropped: 0,
        }
    }

    /// Attach a new subscriber.  It sees samples from now on; there is no replay.
    pub fn subscribe(&mut self) -> Receiver<Sample> {
        let (tx, rx) = crossbeam_channel::bounded(self.capacity);
        self.subscribers.push(tx);
        info!("Live stream: subscriber attached ({} total)", self.subscribers.len());
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Samples dropped on full subscriber queues so far.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl SampleSink for LiveStream {
    fn emit(&mut self, sample: &Sample) {
        let mut dropped = 0;
        self.subscribers.retain(|tx| match tx.try_send(sample.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                dropped += 1;
                true
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("Live stream: subscriber gone");
                false
            }
        });
        if dropped > 0 {
            debug!("Live stream: {dropped} subscriber(s) full, dropped {}/{}", sample.source, sample.parameter);
            self.dropped += dropped;
        }
    }
}
