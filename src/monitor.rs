//! Consumer-side monitor.
//!
//! Drains the data channel on its own thread: every sample is recorded in
//! the [`StoreRegistry`] and then fanned out to the sample sinks (live
//! stream, log).  A storage error ends the monitor and is handed back from
//! [`Monitor::stop`] / [`Monitor::join`]; it means data is being lost on
//! disk and the owning process has to decide what to do about it.
//!
//! Stopping drains whatever is still queued, then flushes every store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use log::{error, info, warn};

use crate::app::events::Sample;
use crate::app::ports::SampleSink;
use crate::error::{StorageError, TaskError};
use crate::storage::StoreRegistry;
use crate::task::spawn::spawn_named;

/// SQLite wants more stack than the task runners.
const MONITOR_STACK_KB: usize = 1024;

pub struct Monitor {
    stop: Arc<AtomicBool>,
    join: JoinHandle<Result<u64, StorageError>>,
}

impl Monitor {
    pub fn spawn(
        data: Receiver<Sample>,
        stores: Arc<StoreRegistry>,
        sinks: Vec<Box<dyn SampleSink>>,
        poll: Duration,
    ) -> Result<Self, TaskError> {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let join = spawn_named("monitor", MONITOR_STACK_KB, move || run(&data, &stores, sinks, poll, &flag))
            .map_err(TaskError::Spawn)?;
        Ok(Self { stop, join })
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Ask the monitor to drain, flush and exit, then wait for it.
    pub fn stop(self) -> Result<u64, StorageError> {
        self.stop.store(true, Ordering::Relaxed);
        self.join()
    }

    /// Wait for the monitor to exit.  Returns the number of samples
    /// recorded, or the storage error that ended it.
    pub fn join(self) -> Result<u64, StorageError> {
        self.join.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic))
    }
}

fn run(
    data: &Receiver<Sample>,
    stores: &StoreRegistry,
    mut sinks: Vec<Box<dyn SampleSink>>,
    poll: Duration,
    stop: &AtomicBool,
) -> Result<u64, StorageError> {
    info!("Monitor running ({} sinks)", sinks.len());
    let mut recorded = 0;

    let outcome = loop {
        if stop.load(Ordering::Relaxed) {
            // Drain without waiting.
            let drained: Result<(), StorageError> = data.try_iter().try_for_each(|s| {
                handle(&s, stores, &mut sinks)?;
                recorded += 1;
                Ok(())
            });
            break drained;
        }
        match data.recv_timeout(poll) {
            Ok(sample) => {
                if let Err(e) = handle(&sample, stores, &mut sinks) {
                    break Err(e);
                }
                recorded += 1;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("Data channel closed");
                break Ok(());
            }
        }
    };

    let flushed = stores.flush_all();
    match outcome {
        Err(e) => {
            error!("Monitor stopped on storage error: {e}");
            if let Err(f) = flushed {
                warn!("Flush after storage error also failed: {f}");
            }
            Err(e)
        }
        Ok(()) => {
            flushed?;
            info!("Monitor finished, {recorded} samples recorded");
            Ok(recorded)
        }
    }
}

fn handle(sample: &Sample, stores: &StoreRegistry, sinks: &mut [Box<dyn SampleSink>]) -> Result<(), StorageError> {
    stores.record(sample)?;
    for sink in sinks.iter_mut() {
        sink.emit(sample);
    }
    Ok(())
}
