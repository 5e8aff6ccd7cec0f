//! Consumer-side handle on the acquisition loop.
//!
//! [`AcquisitionClient::spawn`] starts the acquisition side on its own
//! thread.  The task manager is built on that thread too, so slow hardware
//! setup never blocks the caller; the first `describe` simply waits for it
//! (bounded by its timeout).
//!
//! Requests are numbered.  A reply that turns up after its request has
//! already timed out is recognised by its id and discarded.

use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use log::{debug, error, info};

use crate::app::builder::{build_manager, hardware_for};
use crate::app::commands::{CommandResponse, ControlReply, ControlRequest, TaskCommand};
use crate::app::events::Sample;
use crate::app::service::AcquisitionService;
use crate::config::SystemConfig;
use crate::error::{ChannelError, Error, TaskError};
use crate::params::DescriptionMap;
use crate::task::manager::TaskManager;
use crate::task::spawn::{DEFAULT_STACK_KB, spawn_named};

use super::channels::{ControlEnvelope, ReplyEnvelope, link};

pub struct AcquisitionClient {
    control_tx: Sender<ControlEnvelope>,
    reply_rx: Receiver<ReplyEnvelope>,
    data_rx: Receiver<Sample>,
    next_id: u64,
    join: Option<JoinHandle<()>>,
}

impl AcquisitionClient {
    /// Spawn the acquisition side.  `factory` runs on the new thread and
    /// builds the task manager (including hardware selection).
    pub fn spawn<F>(data_capacity: usize, poll: Duration, factory: F) -> Result<Self, TaskError>
    where
        F: FnOnce() -> Result<TaskManager, TaskError> + Send + 'static,
    {
        let (acq, con) = link(data_capacity);
        let join = spawn_named("acquisition", DEFAULT_STACK_KB, move || match factory() {
            Ok(manager) => {
                AcquisitionService::new(manager, acq, poll).run();
            }
            Err(e) => error!("Acquisition setup failed: {e}"),
        })
        .map_err(TaskError::Spawn)?;

        Ok(Self {
            control_tx: con.control_tx,
            reply_rx: con.reply_rx,
            data_rx: con.data_rx,
            next_id: 1,
            join: Some(join),
        })
    }

    /// Spawn the acquisition side for `cfg`.
    pub fn from_config(cfg: &SystemConfig) -> Result<Self, TaskError> {
        let owned = cfg.clone();
        Self::spawn(
            cfg.data_channel_capacity,
            Duration::from_millis(cfg.control_poll_ms),
            move || build_manager(&owned, hardware_for(&owned)),
        )
    }

    /// Every parameter description, `source → parameter → description`.
    pub fn describe(&mut self, timeout: Duration) -> Result<DescriptionMap, Error> {
        match self.request(ControlRequest::Describe, timeout)? {
            ControlReply::Descriptions(map) => Ok(map),
            _ => Err(ChannelError::UnexpectedReply.into()),
        }
    }

    /// Build the shared buffer and start every task.
    pub fn start(&mut self, timeout: Duration) -> Result<(), Error> {
        match self.request(ControlRequest::Start, timeout)? {
            ControlReply::Started(Ok(())) => Ok(()),
            ControlReply::Started(Err(msg)) => Err(TaskError::StartFailed(msg).into()),
            _ => Err(ChannelError::UnexpectedReply.into()),
        }
    }

    /// Forward a controller command to the task named `source`.
    pub fn command(&mut self, source: &str, command: TaskCommand, timeout: Duration) -> Result<CommandResponse, Error> {
        let request = ControlRequest::Task {
            source: source.to_owned(),
            command,
        };
        match self.request(request, timeout)? {
            ControlReply::Command(result) => result.map_err(Error::from),
            _ => Err(ChannelError::UnexpectedReply.into()),
        }
    }

    /// The live sample channel.
    pub fn data(&self) -> Receiver<Sample> {
        self.data_rx.clone()
    }

    /// Send `TERMINATE` and wait for the acquisition thread to finish.
    /// Safe to call more than once.
    pub fn terminate(&mut self) {
        let Some(join) = self.join.take() else { return };
        let env = ControlEnvelope {
            id: self.next_id(),
            request: ControlRequest::Terminate,
        };
        if self.control_tx.send_timeout(env, Duration::from_secs(1)).is_err() {
            debug!("TERMINATE not delivered, acquisition side already gone");
        }
        if join.join().is_err() {
            error!("Acquisition thread panicked");
        }
        info!("Acquisition side terminated");
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn request(&mut self, request: ControlRequest, timeout: Duration) -> Result<ControlReply, ChannelError> {
        let deadline = Instant::now() + timeout;
        let id = self.next_id();
        self.control_tx
            .send_timeout(ControlEnvelope { id, request }, timeout)
            .map_err(|e| match e {
                SendTimeoutError::Timeout(_) => ChannelError::Timeout,
                SendTimeoutError::Disconnected(_) => ChannelError::Disconnected,
            })?;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.reply_rx.recv_timeout(remaining) {
                Ok(env) if env.id == id => return Ok(env.reply),
                Ok(env) => debug!("Discarding stale reply #{}", env.id),
                Err(RecvTimeoutError::Timeout) => return Err(ChannelError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(ChannelError::Disconnected),
            }
        }
    }
}

impl Drop for AcquisitionClient {
    fn drop(&mut self) {
        self.terminate();
    }
}
