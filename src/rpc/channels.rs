//! Acquisition ↔ consumer channels.
//!
//! Two logically independent links, both `crossbeam-channel`:
//!
//! ```text
//! ┌──────────────────┐  ControlEnvelope  ┌──────────────────┐
//! │                  │◀──────────────────│                  │
//! │   Acquisition    │  ReplyEnvelope    │    Consumer      │
//! │      loop        │──────────────────▶│ (client/monitor) │
//! │                  │  Sample (bounded) │                  │
//! │                  │══════════════════▶│                  │
//! └──────────────────┘                   └──────────────────┘
//! ```
//!
//! The data channel is sized by config and drops on full; the control pair
//! is small and separate, so a backed-up data channel never delays a
//! control reply.  Every request carries an id that its reply echoes.

use crossbeam_channel::{Receiver, Sender};

use crate::app::commands::{ControlReply, ControlRequest};
use crate::app::events::Sample;

/// Depth of the inbound control channel.
pub const CONTROL_DEPTH: usize = 8;

/// Depth of the reply channel.
pub const REPLY_DEPTH: usize = 16;

#[derive(Debug, Clone)]
pub struct ControlEnvelope {
    pub id: u64,
    pub request: ControlRequest,
}

#[derive(Debug, Clone)]
pub struct ReplyEnvelope {
    pub id: u64,
    pub reply: ControlReply,
}

/// Acquisition-side ends.
pub struct AcquisitionEndpoints {
    pub control_rx: Receiver<ControlEnvelope>,
    pub reply_tx: Sender<ReplyEnvelope>,
    pub data_tx: Sender<Sample>,
}

/// Consumer-side ends.
pub struct ConsumerEndpoints {
    pub control_tx: Sender<ControlEnvelope>,
    pub reply_rx: Receiver<ReplyEnvelope>,
    pub data_rx: Receiver<Sample>,
}

/// Build both links.  `data_capacity` bounds the sample channel.
pub fn link(data_capacity: usize) -> (AcquisitionEndpoints, ConsumerEndpoints) {
    let (control_tx, control_rx) = crossbeam_channel::bounded(CONTROL_DEPTH);
    let (reply_tx, reply_rx) = crossbeam_channel::bounded(REPLY_DEPTH);
    let (data_tx, data_rx) = crossbeam_channel::bounded(data_capacity.max(1));
    (
        AcquisitionEndpoints {
            control_rx,
            reply_tx,
            data_tx,
        },
        ConsumerEndpoints {
            control_tx,
            reply_rx,
            data_rx,
        },
    )
}
