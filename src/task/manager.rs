//! Task manager.
//!
//! Owns the hardware handle, the tasks, the common output queue and the
//! shared sample buffer.
//!
//! ```text
//!   add(..) × N ──▶ start_all()                              stop_all()
//!                    ├─ hw.acquire()                          ├─ request stop on every runner
//!                    ├─ build SharedBuffer from descriptions  ├─ join every runner
//!                    ├─ inject (queue, buffer, hw)            └─ hw.release()
//!                    └─ spawn one runner per master
//! ```
//!
//! Stopping signals every runner before joining any of them, so a slow
//! shutdown hook in one task never delays the stop request to the next.

use std::sync::Arc;
use std::thread::JoinHandle;

use chrono::{DateTime, Local};
use crossbeam_channel::{Receiver, Sender};
use log::{error, info};
use parking_lot::Mutex;

use super::spawn::{DEFAULT_STACK_KB, spawn_named};
use super::{PeriodicTask, Runner, SharedCell, StateCell, StopSignal, TaskCell, TaskContext, TaskOptions, TaskState};
use crate::app::commands::{CommandResponse, TaskCommand};
use crate::app::events::Sample;
use crate::app::ports::HardwarePort;
use crate::buffer::SharedBuffer;
use crate::error::{CommandError, TaskError};
use crate::params::{DescriptionMap, insert_all};

struct TaskEntry {
    name: String,
    options: TaskOptions,
    cell: SharedCell,
    state: StateCell,
}

struct RunnerHandle {
    name: String,
    stop: StopSignal,
    join: Option<JoinHandle<()>>,
}

pub struct TaskManager {
    hw: Arc<dyn HardwarePort>,
    out_tx: Sender<Sample>,
    out_rx: Receiver<Sample>,
    entries: Vec<TaskEntry>,
    descriptions: DescriptionMap,
    buffer: Option<Arc<SharedBuffer>>,
    runners: Vec<RunnerHandle>,
    hw_acquired: bool,
}

impl TaskManager {
    /// `queue_capacity` bounds the common output queue shared by every task.
    pub fn new(hw: Arc<dyn HardwarePort>, queue_capacity: usize) -> Self {
        let (out_tx, out_rx) = crossbeam_channel::bounded(queue_capacity);
        Self {
            hw,
            out_tx,
            out_rx,
            entries: Vec::new(),
            descriptions: DescriptionMap::new(),
            buffer: None,
            runners: Vec::new(),
            hw_acquired: false,
        }
    }

    /// Register a task under the source name `name`.
    pub fn add(&mut self, name: &str, task: Box<dyn PeriodicTask>, options: TaskOptions) -> Result<(), TaskError> {
        if self.is_started() {
            return Err(TaskError::AlreadyStarted);
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(TaskError::DuplicateName(name.to_owned()));
        }

        let descs: Vec<_> = task.descriptions().into_iter().map(|d| d.with_source(name)).collect();
        insert_all(&mut self.descriptions, name, &descs);

        self.entries.push(TaskEntry {
            name: name.to_owned(),
            options,
            cell: Arc::new(Mutex::new(TaskCell { task, ctx: None })),
            state: StateCell::new(),
        });
        Ok(())
    }

    /// `source → parameter → description` over every registered task.
    pub fn aggregate_descriptions(&self) -> DescriptionMap {
        self.descriptions.clone()
    }

    /// Consumer end of the common output queue.
    pub fn samples(&self) -> Receiver<Sample> {
        self.out_rx.clone()
    }

    /// The shared buffer, once started.
    pub fn buffer(&self) -> Option<Arc<SharedBuffer>> {
        self.buffer.clone()
    }

    pub fn is_started(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn state(&self, name: &str) -> Option<TaskState> {
        self.entries.iter().find(|e| e.name == name).map(|e| e.state.get())
    }

    /// Acquire the hardware, build the buffer and start every task.
    pub fn start_all(&mut self) -> Result<(), TaskError> {
        if self.is_started() {
            return Err(TaskError::AlreadyStarted);
        }
        self.check_wiring()?;

        self.hw.acquire()?;
        self.hw_acquired = true;
        info!("TaskManager: hardware acquired");

        let buffer = Arc::new(SharedBuffer::new(&self.descriptions));
        for entry in &self.entries {
            entry.cell.lock().ctx = Some(TaskContext::new(
                &entry.name,
                self.out_tx.clone(),
                buffer.clone(),
                self.hw.clone(),
            ));
        }
        self.buffer = Some(buffer);

        let runners: Vec<Runner> = self
            .entries
            .iter()
            .filter(|e| e.options.master.is_none())
            .map(|entry| {
                let slaves: Vec<&TaskEntry> = self
                    .entries
                    .iter()
                    .filter(|s| s.options.master.as_deref() == Some(entry.name.as_str()))
                    .collect();
                Runner {
                    name: entry.name.clone(),
                    period: entry.options.period,
                    master: entry.cell.clone(),
                    slaves: slaves.iter().map(|s| s.cell.clone()).collect(),
                    stop: StopSignal::new(),
                    state: entry.state.clone(),
                    slave_states: slaves.iter().map(|s| s.state.clone()).collect(),
                }
            })
            .collect();

        for runner in runners {
            let name = runner.name.clone();
            let stop = runner.stop.clone();
            match spawn_named(&name, DEFAULT_STACK_KB, move || runner.run()) {
                Ok(join) => self.runners.push(RunnerHandle {
                    name,
                    stop,
                    join: Some(join),
                }),
                Err(e) => {
                    error!("TaskManager: failed to spawn '{name}': {e}");
                    self.stop_all();
                    return Err(TaskError::Spawn(e));
                }
            }
        }
        info!("TaskManager: {} task(s) on {} thread(s)", self.entries.len(), self.runners.len());
        Ok(())
    }

    /// Forward a controller command to the task named `source`.
    ///
    /// Mode and boost changes run one heartbeat straight away so the
    /// outputs follow without waiting for the next period.
    pub fn command(
        &self,
        source: &str,
        cmd: &TaskCommand,
        now: DateTime<Local>,
    ) -> Result<CommandResponse, CommandError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.name == source)
            .ok_or_else(|| CommandError::UnknownTask(source.to_owned()))?;
        let mut cell = entry.cell.lock();
        let response = cell.task.command(cmd, now)?;
        if cmd.forces_heartbeat() {
            cell.heartbeat(now);
        }
        Ok(response)
    }

    /// Signal every runner, join them all, then release the hardware.
    /// Safe to call more than once.
    pub fn stop_all(&mut self) {
        for r in &self.runners {
            r.stop.request();
        }
        for r in &mut self.runners {
            if let Some(join) = r.join.take() {
                if join.join().is_err() {
                    error!("TaskManager: '{}' panicked", r.name);
                }
            }
        }
        self.runners.clear();

        if self.hw_acquired {
            self.hw.release();
            self.hw_acquired = false;
            info!("TaskManager: hardware released");
        }
    }

    fn check_wiring(&self) -> Result<(), TaskError> {
        for entry in &self.entries {
            let Some(master) = &entry.options.master else { continue };
            let m = self
                .entries
                .iter()
                .find(|e| &e.name == master)
                .ok_or_else(|| TaskError::UnknownMaster(master.clone()))?;
            if m.options.master.is_some() {
                return Err(TaskError::NestedSlave(master.clone()));
            }
        }
        Ok(())
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.stop_all();
    }
}
