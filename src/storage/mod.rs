//! Time-series storage: one [`ParamStore`] per `(source, parameter)`.
//!
//! ```text
//!   Monitor ──record──▶ StoreRegistry ──▶ ParamStore  db/Probe-1-Temp.db
//!                                     ──▶ ParamStore  db/DHT1-Humid.db
//!                                     ──▶ …
//! ```
//!
//! The registry is built once from the aggregated parameter descriptions
//! and never grows.  Each store carries its own lock, so writes to
//! different parameters never contend; every method takes `&self` and the
//! registry is shared behind an `Arc`.

pub mod param_store;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{error, info};
use serde::Serialize;

use crate::app::events::Sample;
use crate::config::StorageConfig;
use crate::error::StorageError;
use crate::params::DescriptionMap;

pub use param_store::{Chunk, ParamStore};

/// Which table a history query reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Raw,
    Compacted,
}

/// One row of a history query.  Raw rows have `value == min == max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Row {
    pub timestamp_ms: i64,
    pub value: f64,
    pub min: f64,
    pub max: f64,
}

pub struct StoreRegistry {
    dir: PathBuf,
    stores: BTreeMap<(String, String), ParamStore>,
}

impl StoreRegistry {
    /// Open (creating where needed) a store for every described parameter.
    pub fn open(dir: &Path, descriptions: &DescriptionMap, policy: &StorageConfig) -> Result<Self, StorageError> {
        std::fs::create_dir_all(dir)?;
        let mut stores = BTreeMap::new();
        for (source, params) in descriptions {
            for (parameter, desc) in params {
                let path = dir.join(file_name(source, parameter));
                let store = ParamStore::open(&path, desc, policy)?;
                stores.insert((source.clone(), parameter.clone()), store);
            }
        }
        info!("Store registry: {} stores in {}", stores.len(), dir.display());
        Ok(Self {
            dir: dir.to_owned(),
            stores,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn len(&self) -> usize {
        self.stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    pub fn store(&self, source: &str, parameter: &str) -> Option<&ParamStore> {
        self.stores.get(&(source.to_owned(), parameter.to_owned()))
    }

    /// Write `sample` into its store.
    ///
    /// A sample for an undescribed parameter is a wiring bug: debug builds
    /// panic, release builds log and drop it.
    pub fn record(&self, sample: &Sample) -> Result<(), StorageError> {
        let Some(store) = self.store(&sample.source, &sample.parameter) else {
            error!("No store for {}/{}, sample dropped", sample.source, sample.parameter);
            debug_assert!(false, "sample for undescribed parameter {}/{}", sample.source, sample.parameter);
            return Ok(());
        };
        store.write(sample.timestamp_ms(), sample.value)
    }

    /// Commit every store.  All stores are attempted; the first error is
    /// returned.
    pub fn flush_all(&self) -> Result<(), StorageError> {
        let mut first = None;
        for ((source, parameter), store) in &self.stores {
            if let Err(e) = store.flush() {
                error!("Flush of {source}/{parameter} failed: {e}");
                first.get_or_insert(e);
            }
        }
        match first {
            Some(e) => Err(e),
            None => {
                info!("Flushed {} stores", self.stores.len());
                Ok(())
            }
        }
    }

    /// History for one parameter, `t0 ≤ timestamp ≤ t1`, oldest first.
    pub fn query(
        &self,
        source: &str,
        parameter: &str,
        t0: i64,
        t1: i64,
        resolution: Resolution,
    ) -> Result<Vec<Row>, StorageError> {
        let store = self
            .store(source, parameter)
            .ok_or_else(|| StorageError::UnknownParameter {
                source: source.to_owned(),
                parameter: parameter.to_owned(),
            })?;
        Ok(match resolution {
            Resolution::Raw => store
                .query_raw(t0, t1)?
                .into_iter()
                .map(|(timestamp_ms, value)| Row {
                    timestamp_ms,
                    value,
                    min: value,
                    max: value,
                })
                .collect(),
            Resolution::Compacted => store
                .query_compacted(t0, t1)?
                .into_iter()
                .map(|c| Row {
                    timestamp_ms: c.timestamp,
                    value: c.avg,
                    min: c.min,
                    max: c.max,
                })
                .collect(),
        })
    }
}

/// `<source>-<parameter>.db`, with anything outside `[A-Za-z0-9._-]`
/// replaced by `-`.
pub fn file_name(source: &str, parameter: &str) -> String {
    let clean = |s: &str| -> String {
        s.chars()
            .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') { c } else { '-' })
            .collect()
    };
    format!("{}-{}.db", clean(source), clean(parameter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{Category, ParameterDescription, insert_all};
    use chrono::{Local, TimeZone};

    fn descriptions() -> DescriptionMap {
        let mut map = DescriptionMap::new();
        insert_all(
            &mut map,
            "Probe 1",
            &[ParameterDescription::float("Temp", "Temp", Category::Temperature, -10.0, 40.0, "C")
                .with_source("Probe 1")],
        );
        insert_all(
            &mut map,
            "DHT1",
            &[
                ParameterDescription::float("Temp", "Temp", Category::Temperature, -10.0, 40.0, "C").with_source("DHT1"),
                ParameterDescription::float("Humid", "Humid", Category::Humidity, 0.0, 100.0, "%").with_source("DHT1"),
            ],
        );
        map
    }

    fn policy(dir: &Path) -> StorageConfig {
        StorageConfig {
            dir: dir.to_owned(),
            max_commit_delay_secs: 20,
            chunk_width_ms: 600_000,
        }
    }

    fn sample(source: &str, parameter: &str, ms: i64, value: f64) -> Sample {
        let ts = Local.timestamp_millis_opt(ms).single().unwrap();
        Sample::new(source, parameter, ts, value)
    }

    #[test]
    fn file_names_are_normalised() {
        assert_eq!(file_name("Probe 1", "Temp"), "Probe-1-Temp.db");
        assert_eq!(file_name("Grow Lights", "PWM/%"), "Grow-Lights-PWM--.db");
        assert_eq!(file_name("a_b.c", "x-y"), "a_b.c-x-y.db");
    }

    #[test]
    fn one_file_per_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let reg = StoreRegistry::open(&dir.path().join("db"), &descriptions(), &policy(dir.path())).unwrap();
        assert_eq!(reg.len(), 3);
        assert!(dir.path().join("db/DHT1-Humid.db").exists());
        assert!(dir.path().join("db/Probe-1-Temp.db").exists());
        assert_eq!(reg.store("DHT1", "Humid").unwrap().multiplier(), 10.0);
    }

    #[test]
    fn record_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let reg = StoreRegistry::open(dir.path(), &descriptions(), &policy(dir.path())).unwrap();
        reg.record(&sample("DHT1", "Humid", 1_000, 55.56)).unwrap();
        reg.record(&sample("DHT1", "Humid", 5_000, 56.0)).unwrap();
        reg.record(&sample("Probe 1", "Temp", 1_000, 20.0)).unwrap();
        reg.flush_all().unwrap();

        let rows = reg.query("DHT1", "Humid", 0, 10_000, Resolution::Raw).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].timestamp_ms, 1_000);
        assert!((rows[0].value - 55.6).abs() < 1e-9);
        assert_eq!(rows[0].min, rows[0].value);
        assert!(reg.query("DHT1", "Humid", 0, 10_000, Resolution::Compacted).unwrap().is_empty());
    }

    #[test]
    fn query_unknown_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let reg = StoreRegistry::open(dir.path(), &descriptions(), &policy(dir.path())).unwrap();
        assert!(matches!(
            reg.query("Nope", "Temp", 0, 1, Resolution::Raw),
            Err(StorageError::UnknownParameter { .. })
        ));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "undescribed parameter")]
    fn record_unknown_panics_in_debug() {
        let dir = tempfile::tempdir().unwrap();
        let reg = StoreRegistry::open(dir.path(), &descriptions(), &policy(dir.path())).unwrap();
        let _ = reg.record(&sample("Nope", "Temp", 0, 1.0));
    }
}
