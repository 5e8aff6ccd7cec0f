//! One parameter's history in one SQLite file.
//!
//! ```text
//!   raw_data   (timestamp INTEGER PRIMARY KEY, val INTEGER)
//!   comp_data  (timestamp INTEGER PRIMARY KEY, avg REAL, min INTEGER, max INTEGER)
//!   meta_data  (key TEXT PRIMARY KEY, val TEXT)
//! ```
//!
//! Values are stored as integers: `round(value × multiplier)`.  The
//! multiplier and chunk width are chosen from the description when the
//! file is first created and recorded in `meta_data`; a reopened file
//! always uses what it recorded, whatever the description says now.
//!
//! ## Commit policy
//!
//! Writes go into an open transaction.  It is committed only once
//! `max_commit_delay` has elapsed since the last commit (or on
//! [`flush`](ParamStore::flush)); a per-sample commit costs orders of
//! magnitude more than the insert.  Queries run on the same connection and
//! see uncommitted rows.
//!
//! ## Compaction
//!
//! After every commit, complete windows are folded into `comp_data`.  A
//! window starts at the first raw timestamp after the last chunk's end and
//! covers `[start, start + width]`; its row is keyed by `start + width`.
//! A window is complete once a raw sample newer than its end exists.
//! Rows are written with `INSERT OR REPLACE`, so re-running compaction
//! over the same raw data reproduces the same rows.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use serde::Serialize;

use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::params::ParameterDescription;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS raw_data (
        timestamp INTEGER PRIMARY KEY,
        val INTEGER
    );
    CREATE TABLE IF NOT EXISTS comp_data (
        timestamp INTEGER PRIMARY KEY,
        avg REAL,
        min INTEGER,
        max INTEGER
    );
    CREATE TABLE IF NOT EXISTS meta_data (
        key TEXT PRIMARY KEY,
        val TEXT
    );";

const KEY_DESCRIPTION: &str = "description";
const KEY_MULTIPLIER: &str = "val_comp_mult";
const KEY_CHUNK_WIDTH: &str = "chunk_width_ms";

/// One compacted window.  `timestamp` is the window end.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Chunk {
    pub timestamp: i64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

struct Inner {
    conn: Connection,
    max_delay: Duration,
    last_commit: Instant,
    /// End of the newest compacted window.
    compacted_to: Option<i64>,
}

pub struct ParamStore {
    path: PathBuf,
    multiplier: f64,
    chunk_width_ms: i64,
    description: ParameterDescription,
    inner: Mutex<Inner>,
}

impl ParamStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path, desc: &ParameterDescription, policy: &StorageConfig) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;

        let mut meta = read_meta(&conn)?;
        if meta.is_empty() {
            let multiplier = desc.category.compression_multiplier();
            let json = serde_json::to_string(desc).map_err(|e| StorageError::Metadata(e.to_string()))?;
            let tx = conn.unchecked_transaction()?;
            for (k, v) in [
                (KEY_DESCRIPTION, json),
                (KEY_MULTIPLIER, multiplier.to_string()),
                (KEY_CHUNK_WIDTH, policy.chunk_width_ms.to_string()),
            ] {
                tx.execute("INSERT INTO meta_data (key, val) VALUES (?1, ?2)", params![k, v])?;
            }
            tx.commit()?;
            info!("Store {}: initialised (multiplier {multiplier})", path.display());
            meta = read_meta(&conn)?;
        }

        let multiplier: f64 = meta_value(&meta, KEY_MULTIPLIER)?;
        if !(multiplier.is_finite() && multiplier > 0.0) {
            return Err(StorageError::Metadata(format!("bad {KEY_MULTIPLIER} {multiplier}")));
        }
        let chunk_width_ms: i64 = meta_value(&meta, KEY_CHUNK_WIDTH)?;
        if chunk_width_ms <= 0 {
            return Err(StorageError::Metadata(format!("bad {KEY_CHUNK_WIDTH} {chunk_width_ms}")));
        }
        let description = meta
            .get(KEY_DESCRIPTION)
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_else(|| desc.clone());

        let compacted_to: Option<i64> = conn.query_row("SELECT MAX(timestamp) FROM comp_data", [], |r| r.get(0))?;
        debug!("Store {}: opened, compacted to {compacted_to:?}", path.display());

        Ok(Self {
            path: path.to_owned(),
            multiplier,
            chunk_width_ms,
            description,
            inner: Mutex::new(Inner {
                conn,
                max_delay: Duration::from_secs(policy.max_commit_delay_secs),
                last_commit: Instant::now(),
                compacted_to,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The multiplier recorded when the file was created.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    pub fn chunk_width_ms(&self) -> i64 {
        self.chunk_width_ms
    }

    /// The description recorded when the file was created.
    pub fn description(&self) -> &ParameterDescription {
        &self.description
    }

    /// Append one raw sample; commits and compacts if the delay is up.
    /// Values that do not fit the integer column (NaN, infinite, out of
    /// range after scaling) are dropped with a warning.
    pub fn write(&self, timestamp_ms: i64, value: f64) -> Result<(), StorageError> {
        let scaled = (value * self.multiplier).round();
        if !(scaled.is_finite() && scaled.abs() < i64::MAX as f64) {
            warn!("Store {}: unstorable value {value} at {timestamp_ms} dropped", self.path.display());
            return Ok(());
        }
        let stored = scaled as i64;
        let mut inner = self.inner.lock();
        if inner.conn.is_autocommit() {
            inner.conn.execute_batch("BEGIN")?;
        }
        let n = inner.conn.execute(
            "INSERT OR IGNORE INTO raw_data (timestamp, val) VALUES (?1, ?2)",
            params![timestamp_ms, stored],
        )?;
        if n == 0 {
            warn!("Store {}: duplicate timestamp {timestamp_ms} ignored", self.path.display());
        }
        if inner.last_commit.elapsed() >= inner.max_delay {
            self.commit_and_compact(&mut inner)?;
        }
        Ok(())
    }

    /// Commit pending writes and compact any complete windows.
    pub fn flush(&self) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        self.commit_and_compact(&mut inner)
    }

    /// Raw rows with `t0 ≤ timestamp ≤ t1`, oldest first.
    pub fn query_raw(&self, t0: i64, t1: i64) -> Result<Vec<(i64, f64)>, StorageError> {
        let inner = self.inner.lock();
        let mut stmt = inner
            .conn
            .prepare_cached("SELECT timestamp, val FROM raw_data WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp")?;
        let rows = stmt.query_map(params![t0, t1], |r| {
            Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)? as f64 / self.multiplier))
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    /// Compacted rows with `t0 ≤ window end ≤ t1`, oldest first.
    pub fn query_compacted(&self, t0: i64, t1: i64) -> Result<Vec<Chunk>, StorageError> {
        let inner = self.inner.lock();
        let mut stmt = inner.conn.prepare_cached(
            "SELECT timestamp, avg, min, max FROM comp_data WHERE timestamp >= ?1 AND timestamp <= ?2 ORDER BY timestamp",
        )?;
        let rows = stmt.query_map(params![t0, t1], |r| {
            Ok(Chunk {
                timestamp: r.get(0)?,
                avg: r.get::<_, f64>(1)? / self.multiplier,
                min: r.get::<_, i64>(2)? as f64 / self.multiplier,
                max: r.get::<_, i64>(3)? as f64 / self.multiplier,
            })
        })?;
        Ok(rows.collect::<Result<_, _>>()?)
    }

    fn commit_and_compact(&self, inner: &mut Inner) -> Result<(), StorageError> {
        if !inner.conn.is_autocommit() {
            inner.conn.execute_batch("COMMIT")?;
        }
        inner.last_commit = Instant::now();
        self.compact(inner)
    }

    fn compact(&self, inner: &mut Inner) -> Result<(), StorageError> {
        let newest: Option<i64> = inner.conn.query_row("SELECT MAX(timestamp) FROM raw_data", [], |r| r.get(0))?;
        let Some(newest) = newest else { return Ok(()) };

        let tx = inner.conn.transaction()?;
        let mut compacted_to = inner.compacted_to;
        let mut chunks = 0;
        loop {
            let start: Option<i64> = tx.query_row(
                "SELECT MIN(timestamp) FROM raw_data WHERE timestamp > ?1",
                params![compacted_to.unwrap_or(i64::MIN)],
                |r| r.get(0),
            )?;
            let Some(start) = start else { break };
            let end = start + self.chunk_width_ms;
            if newest <= end {
                break;
            }
            // The window always holds `start`, so the aggregates are never NULL.
            let (avg, min, max): (f64, i64, i64) = tx.query_row(
                "SELECT AVG(val), MIN(val), MAX(val) FROM raw_data WHERE timestamp >= ?1 AND timestamp <= ?2",
                params![start, end],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )?;
            tx.execute(
                "INSERT OR REPLACE INTO comp_data (timestamp, avg, min, max) VALUES (?1, ?2, ?3, ?4)",
                params![end, avg, min, max],
            )?;
            chunks += 1;
            compacted_to = Some(end);
        }
        tx.commit()?;

        inner.compacted_to = compacted_to;
        if chunks > 0 {
            debug!("Store {}: compacted {chunks} chunk(s) up to {compacted_to:?}", self.path.display());
        }
        Ok(())
    }
}

impl Drop for ParamStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("Store {}: flush on close failed: {e}", self.path.display());
        }
    }
}

fn read_meta(conn: &Connection) -> Result<HashMap<String, String>, StorageError> {
    let mut stmt = conn.prepare("SELECT key, val FROM meta_data")?;
    let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
    Ok(rows.collect::<Result<_, _>>()?)
}

fn meta_value<T: std::str::FromStr>(meta: &HashMap<String, String>, key: &str) -> Result<T, StorageError> {
    meta.get(key)
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| StorageError::Metadata(format!("missing or invalid {key}")))
}
