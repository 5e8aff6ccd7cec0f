//! Shared sample buffer.
//!
//! A fixed-depth, newest-first ring of `(timestamp, value)` for every
//! `(source, parameter)` known when the tasks are started.  The acquisition
//! loop is the only writer; control tasks read other tasks' latest values
//! from it without touching the producers.
//!
//! ```text
//!   acquisition loop ──push──▶ ┌──────────────── RwLock ───────────────┐
//!                              │ probe/Temp   [t9 t8 t7 ... t0]        │
//!                              │ light/Light  [t4 t3 t2 t1 t0]         │ ◀──read_last── heater
//!                              └───────────────────────────────────────┘ ◀──with_lock── light ctrl
//! ```
//!
//! One coarse lock covers the whole structure.  Entries are small and reads
//! are brief; at a few dozen parameters there is nothing to gain from
//! per-entry locking.

use std::collections::HashMap;

use chrono::{DateTime, Local};
use heapless::Deque;
use log::warn;
use parking_lot::RwLock;

use crate::params::DescriptionMap;

/// Ring depth used by the task manager.
pub const BUFFER_DEPTH: usize = 10;

/// The buffer type the task manager builds.
pub type SharedBuffer = SampleBuffer<BUFFER_DEPTH>;

/// One buffered reading.
pub type Reading = (DateTime<Local>, f64);

type Entries<const N: usize> = HashMap<String, HashMap<String, Deque<Reading, N>>>;

pub struct SampleBuffer<const N: usize> {
    entries: RwLock<Entries<N>>,
}

impl<const N: usize> SampleBuffer<N> {
    /// One empty ring per described parameter.  The key set is fixed for
    /// the buffer's lifetime.
    pub fn new(descriptions: &DescriptionMap) -> Self {
        let entries = descriptions
            .iter()
            .map(|(source, params)| {
                let rings = params.keys().map(|p| (p.clone(), Deque::new())).collect();
                (source.clone(), rings)
            })
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Insert the newest reading, evicting the oldest when full.
    ///
    /// Unknown keys are logged and dropped; the buffer never grows new keys.
    pub fn push(&self, source: &str, parameter: &str, timestamp: DateTime<Local>, value: f64) {
        let mut entries = self.entries.write();
        let Some(ring) = entries.get_mut(source).and_then(|p| p.get_mut(parameter)) else {
            warn!("buffer: no entry for {source}/{parameter}, sample dropped");
            return;
        };
        if ring.is_full() {
            ring.pop_back();
        }
        // Cannot fail: a slot was freed above if the ring was full.
        let _ = ring.push_front((timestamp, value));
    }

    /// Newest reading of one parameter.
    pub fn read_last(&self, source: &str, parameter: &str) -> Option<Reading> {
        self.with_lock(|view| view.last(source, parameter))
    }

    /// Every buffered reading of one parameter, newest first.
    pub fn read_all(&self, source: &str, parameter: &str) -> Vec<Reading> {
        self.with_lock(|view| view.all(source, parameter))
    }

    /// Run `f` with the whole buffer held under a single read lock, for a
    /// consistent read across several parameters.
    pub fn with_lock<R>(&self, f: impl FnOnce(&BufferView<'_, N>) -> R) -> R {
        let entries = self.entries.read();
        f(&BufferView { entries: &entries })
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

/// Read-only view handed to [`SampleBuffer::with_lock`].
pub struct BufferView<'a, const N: usize> {
    entries: &'a Entries<N>,
}

impl<const N: usize> BufferView<'_, N> {
    pub fn last(&self, source: &str, parameter: &str) -> Option<Reading> {
        self.ring(source, parameter).and_then(|r| r.front().copied())
    }

    pub fn all(&self, source: &str, parameter: &str) -> Vec<Reading> {
        self.ring(source, parameter)
            .map(|r| r.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self, source: &str, parameter: &str) -> usize {
        self.ring(source, parameter).map_or(0, Deque::len)
    }

    fn ring(&self, source: &str, parameter: &str) -> Option<&Deque<Reading, N>> {
        self.entries.get(source)?.get(parameter)
    }
}
