//! Periodic tasks.
//!
//! Every sensor reader and actuator controller is a [`PeriodicTask`]: a
//! set of lifecycle hooks driven by a runner thread.
//!
//! ```text
//!   Created ──start──▶ Running ──request_stop──▶ Stopping ──▶ Stopped
//!                        │ ▲
//!                        ▼ │
//!        trigger = now ─▶ slave heartbeats ─▶ own heartbeat ─▶ sleep(period − elapsed)
//! ```
//!
//! A task configured as a **slave** never gets a thread or timer of its
//! own: its master's runner calls its heartbeat immediately before the
//! master's, with the same trigger time, so a controller always sees the
//! reading its sensor just produced.
//!
//! Heartbeat time is subtracted from the period.  An overrunning heartbeat
//! makes the next one start immediately; the sleep is never negative and
//! the schedule never tries to catch up.

pub mod manager;
pub mod spawn;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::app::commands::{CommandResponse, TaskCommand};
use crate::app::events::Sample;
use crate::app::ports::HardwarePort;
use crate::buffer::SharedBuffer;
use crate::error::{CommandError, HardwareError};
use crate::params::ParameterDescription;

// ═══════════════════════════════════════════════════════════════
//  Task trait
// ═══════════════════════════════════════════════════════════════

/// A sensor reader or actuator controller.
pub trait PeriodicTask: Send {
    /// Parameters this task emits.  Read once, when the task is added.
    fn descriptions(&self) -> Vec<ParameterDescription>;

    /// Runs on the task's thread before the first heartbeat.
    fn startup(&mut self, _ctx: &TaskContext) -> Result<(), HardwareError> {
        Ok(())
    }

    /// One sampling/control step.  `trigger` is the start of the cycle and
    /// is the timestamp of every sample emitted.
    ///
    /// A failed read skips that parameter for this cycle; it never emits a
    /// made-up value.
    fn heartbeat(&mut self, trigger: DateTime<Local>, ctx: &TaskContext);

    /// Runs on the task's thread after the last heartbeat.
    fn shutdown(&mut self, _ctx: &TaskContext) {}

    /// Controller command handler.
    fn command(&mut self, _cmd: &TaskCommand, _now: DateTime<Local>) -> Result<CommandResponse, CommandError> {
        Err(CommandError::Unsupported)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Task context
// ═══════════════════════════════════════════════════════════════

/// Handles injected into a task by the manager at start.
pub struct TaskContext {
    source: String,
    out: Sender<Sample>,
    pub buffer: Arc<SharedBuffer>,
    pub hw: Arc<dyn HardwarePort>,
}

impl TaskContext {
    pub fn new(source: &str, out: Sender<Sample>, buffer: Arc<SharedBuffer>, hw: Arc<dyn HardwarePort>) -> Self {
        Self {
            source: source.to_owned(),
            out,
            buffer,
            hw,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Queue one sample on the common output queue.  Never blocks: a full
    /// queue drops the sample.
    pub fn emit(&self, parameter: &str, trigger: DateTime<Local>, value: f64) {
        match self.out.try_send(Sample::new(&self.source, parameter, trigger, value)) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("{}: output queue full, {} sample dropped", self.source, parameter);
            }
            Err(TrySendError::Disconnected(_)) => {
                debug!("{}: output queue closed, {} sample dropped", self.source, parameter);
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Options
// ═══════════════════════════════════════════════════════════════

/// How a task is scheduled.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOptions {
    pub period: Duration,
    /// Run as a slave of this task.
    pub master: Option<String>,
}

impl TaskOptions {
    pub fn every(period: Duration) -> Self {
        Self { period, master: None }
    }

    #[must_use]
    pub fn slave_of(mut self, master: &str) -> Self {
        self.master = Some(master.to_owned());
        self
    }
}

// ═══════════════════════════════════════════════════════════════
//  Lifecycle state
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TaskState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

/// Lock-free state cell shared between a runner and its handle.
#[derive(Debug, Clone)]
pub(crate) struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(TaskState::Created as u8)))
    }

    pub(crate) fn set(&self, state: TaskState) {
        self.0.store(state as u8, Ordering::Release);
    }

    pub(crate) fn get(&self) -> TaskState {
        match self.0.load(Ordering::Acquire) {
            0 => TaskState::Created,
            1 => TaskState::Running,
            2 => TaskState::Stopping,
            _ => TaskState::Stopped,
        }
    }
}

// ═══════════════════════════════════════════════════════════════
//  Stop signal
// ═══════════════════════════════════════════════════════════════

/// Cooperative stop request.  Cloned into the runner; the sleep between
/// heartbeats wakes as soon as a stop is requested.
#[derive(Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

struct StopInner {
    flag: AtomicBool,
    /// Dropped on request, which disconnects `wake`.
    trigger: Mutex<Option<Sender<()>>>,
    wake: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            inner: Arc::new(StopInner {
                flag: AtomicBool::new(false),
                trigger: Mutex::new(Some(tx)),
                wake: rx,
            }),
        }
    }

    pub fn request(&self) {
        self.inner.flag.store(true, Ordering::Release);
        self.inner.trigger.lock().take();
    }

    pub fn is_requested(&self) -> bool {
        self.inner.flag.load(Ordering::Acquire)
    }

    /// Sleep for up to `timeout`.  Returns `true` if a stop was requested.
    pub fn sleep(&self, timeout: Duration) -> bool {
        if self.is_requested() {
            return true;
        }
        match self.inner.wake.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_requested(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════
//  Task cell and runner
// ═══════════════════════════════════════════════════════════════

/// A task plus its injected context.  Shared between the runner thread
/// and the manager's command path, which serialise on the mutex.
pub(crate) struct TaskCell {
    pub(crate) task: Box<dyn PeriodicTask>,
    pub(crate) ctx: Option<TaskContext>,
}

pub(crate) type SharedCell = Arc<Mutex<TaskCell>>;

impl TaskCell {
    fn startup(&mut self) {
        if let Some(ctx) = &self.ctx {
            if let Err(e) = self.task.startup(ctx) {
                error!("{}: startup failed: {e}", ctx.source());
            }
        }
    }

    pub(crate) fn heartbeat(&mut self, trigger: DateTime<Local>) {
        if let Some(ctx) = &self.ctx {
            self.task.heartbeat(trigger, ctx);
        }
    }

    fn shutdown(&mut self) {
        if let Some(ctx) = &self.ctx {
            self.task.shutdown(ctx);
        }
    }
}

/// Drives one master task and its slaves on the current thread.
pub(crate) struct Runner {
    pub(crate) name: String,
    pub(crate) period: Duration,
    pub(crate) master: SharedCell,
    pub(crate) slaves: Vec<SharedCell>,
    pub(crate) stop: StopSignal,
    pub(crate) state: StateCell,
    pub(crate) slave_states: Vec<StateCell>,
}

impl Runner {
    fn set_state(&self, state: TaskState) {
        self.state.set(state);
        for s in &self.slave_states {
            s.set(state);
        }
    }

    pub(crate) fn run(self) {
        self.set_state(TaskState::Running);
        info!("{}: started (period {:?}, {} slave(s))", self.name, self.period, self.slaves.len());

        for slave in &self.slaves {
            slave.lock().startup();
        }
        self.master.lock().startup();

        while !self.stop.is_requested() {
            let trigger = Local::now();
            let started = Instant::now();

            // Slaves first so their outputs reflect this cycle.
            for slave in &self.slaves {
                slave.lock().heartbeat(trigger);
            }
            if self.stop.is_requested() {
                break;
            }
            self.master.lock().heartbeat(trigger);

            let remaining = self.period.saturating_sub(started.elapsed());
            if self.stop.sleep(remaining) {
                break;
            }
        }

        self.set_state(TaskState::Stopping);
        self.master.lock().shutdown();
        for slave in &self.slaves {
            slave.lock().shutdown();
        }
        self.set_state(TaskState::Stopped);
        info!("{}: stopped", self.name);
    }
}
