//! Consumer-facing link to the acquisition side.
//!
//! ```text
//!   AcquisitionClient ──control──▶ AcquisitionService ──▶ TaskManager
//!          ▲                              │
//!          └────────reply─────────────────┤
//!   Monitor ◀════════samples══════════════┘
//! ```
//!
//! [`channels`] builds the channel pair; [`client`] wraps the consumer
//! ends in a request/reply API with timeouts.

pub mod channels;
pub mod client;
