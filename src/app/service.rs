//! Acquisition service: the loop on the producing side of the link.
//!
//! [`AcquisitionService`] owns the [`TaskManager`] and is the single
//! writer of the shared buffer.  One iteration, in order:
//!
//! 1. non-blocking check of the control channel (`START`, `DESCRIBE`,
//!    task commands; `TERMINATE` ends the loop once this iteration is done);
//! 2. bounded-timeout pop from the common output queue;
//! 3. push the sample into the shared buffer;
//! 4. non-blocking forward onto the data channel, dropping on full.
//!
//! ```text
//!   tasks ──queue──▶ ┌──────────────────────┐ ══data══▶ consumer
//!                    │  AcquisitionService  │
//!   consumer ─ctl──▶ │  TaskManager·buffer  │ ──reply─▶ consumer
//!                    └──────────────────────┘
//! ```
//!
//! When the loop ends every task is stopped and the hardware released.

use std::time::Duration;

use chrono::Local;
use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError, TrySendError};
use log::{debug, info, warn};

use crate::rpc::channels::{AcquisitionEndpoints, ControlEnvelope, ReplyEnvelope};
use crate::task::manager::TaskManager;

use super::commands::{ControlReply, ControlRequest};
use super::events::Sample;

/// Counters kept by the loop, reported on exit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub forwarded: u64,
    pub dropped: u64,
    pub requests: u64,
}

pub struct AcquisitionService {
    manager: TaskManager,
    samples: Receiver<Sample>,
    link: AcquisitionEndpoints,
    poll: Duration,
    stats: LoopStats,
    terminating: bool,
}

impl AcquisitionService {
    pub fn new(manager: TaskManager, link: AcquisitionEndpoints, poll: Duration) -> Self {
        let samples = manager.samples();
        Self {
            manager,
            samples,
            link,
            poll,
            stats: LoopStats::default(),
            terminating: false,
        }
    }

    /// Run until `TERMINATE` (or the consumer goes away), then stop every
    /// task and release the hardware.
    pub fn run(mut self) -> LoopStats {
        info!("Acquisition loop running");
        while self.step() {}
        self.manager.stop_all();
        info!(
            "Acquisition loop finished: {} forwarded, {} dropped, {} requests",
            self.stats.forwarded, self.stats.dropped, self.stats.requests
        );
        self.stats
    }

    /// One loop iteration.  Returns `false` once the loop should end.
    pub fn step(&mut self) -> bool {
        // (1) control
        match self.link.control_rx.try_recv() {
            Ok(env) => self.handle(env),
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                if !self.terminating {
                    info!("Control channel closed, terminating");
                }
                self.terminating = true;
            }
        }

        // (2) pop
        match self.samples.recv_timeout(self.poll) {
            Ok(sample) => {
                // (3) buffer
                if let Some(buffer) = self.manager.buffer() {
                    buffer.push(&sample.source, &sample.parameter, sample.timestamp, sample.value);
                }
                // (4) forward
                self.forward(sample);
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => self.terminating = true,
        }

        !self.terminating
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    pub fn manager(&self) -> &TaskManager {
        &self.manager
    }

    fn forward(&mut self, sample: Sample) {
        match self.link.data_tx.try_send(sample) {
            Ok(()) => self.stats.forwarded += 1,
            Err(TrySendError::Full(s)) => {
                self.stats.dropped += 1;
                warn!("Data channel full, dropped {}/{}", s.source, s.parameter);
            }
            Err(TrySendError::Disconnected(s)) => {
                self.stats.dropped += 1;
                debug!("Data channel closed, dropped {}/{}", s.source, s.parameter);
            }
        }
    }

    fn handle(&mut self, env: ControlEnvelope) {
        self.stats.requests += 1;
        debug!("Control request #{}: {}", env.id, env.request);
        let reply = match env.request {
            ControlRequest::Terminate => {
                info!("TERMINATE received");
                self.terminating = true;
                return;
            }
            ControlRequest::Describe => ControlReply::Descriptions(self.manager.aggregate_descriptions()),
            ControlRequest::Start => {
                let result = self.manager.start_all();
                match &result {
                    Ok(()) => info!("START: all tasks running"),
                    Err(e) => warn!("START failed: {e}"),
                }
                ControlReply::Started(result.map_err(|e| e.to_string()))
            }
            ControlRequest::Task { source, command } => {
                let result = self.manager.command(&source, &command, Local::now());
                if let Err(e) = &result {
                    warn!("Command for '{source}' failed: {e}");
                }
                ControlReply::Command(result)
            }
        };
        if self.link.reply_tx.try_send(ReplyEnvelope { id: env.id, reply }).is_err() {
            warn!("Reply #{} dropped, consumer not reading replies", env.id);
        }
    }
}
