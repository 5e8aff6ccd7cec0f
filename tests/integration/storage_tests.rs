//! Integration tests for the consumer side: data channel → monitor →
//! per-parameter stores → history queries.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Local, TimeZone};
use greenhouse::adapters::live::LiveStream;
use greenhouse::app::events::Sample;
use greenhouse::config::StorageConfig;
use greenhouse::monitor::Monitor;
use greenhouse::params::{Category, DescriptionMap, ParameterDescription, insert_all};
use greenhouse::storage::{Resolution, StoreRegistry};

const T0: i64 = 1_700_000_000_000;
const PERIOD_MS: i64 = 4_000;
const CHUNK_MS: i64 = 600_000;

fn descriptions() -> DescriptionMap {
    let mut map = DescriptionMap::new();
    insert_all(
        &mut map,
        "Probe 1",
        &[ParameterDescription::float("Temp", "Temp", Category::Temperature, -10.0, 40.0, "C").with_source("Probe 1")],
    );
    map
}

fn policy(dir: &std::path::Path, delay_secs: u64) -> StorageConfig {
    StorageConfig {
        dir: dir.to_owned(),
        max_commit_delay_secs: delay_secs,
        chunk_width_ms: CHUNK_MS,
    }
}

fn sample(ms: i64, value: f64) -> Sample {
    Sample::new("Probe 1", "Temp", Local.timestamp_millis_opt(ms).single().unwrap(), value)
}

/// Temperature wandering between 10 and 30 °C.
fn value(k: i64) -> f64 {
    20.0 + 10.0 * ((k as f64) / 7.0).sin()
}

#[test]
fn three_heartbeats_then_one_chunk() {
    let dir = tempfile::tempdir().unwrap();
    let stores = Arc::new(StoreRegistry::open(dir.path(), &descriptions(), &policy(dir.path(), 0)).unwrap());
    let (tx, rx) = crossbeam_channel::bounded(1000);
    let monitor = Monitor::spawn(rx, stores.clone(), Vec::new(), Duration::from_millis(5)).unwrap();

    for k in 0..3 {
        tx.send(sample(T0 + k * PERIOD_MS, value(k))).unwrap();
    }
    // Wait for the monitor to catch up.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    let rows = loop {
        let rows = stores.query("Probe 1", "Temp", T0, T0 + CHUNK_MS, Resolution::Raw).unwrap();
        if rows.len() == 3 || std::time::Instant::now() > deadline {
            break rows;
        }
        std::thread::sleep(Duration::from_millis(10));
    };
    assert_eq!(rows.len(), 3);
    for pair in rows.windows(2) {
        assert_eq!(pair[1].timestamp_ms - pair[0].timestamp_ms, PERIOD_MS);
    }

    // Heartbeats until one lands past the first window's end.
    let last = CHUNK_MS / PERIOD_MS + 1;
    for k in 3..=last {
        tx.send(sample(T0 + k * PERIOD_MS, value(k))).unwrap();
    }
    assert_eq!(monitor.stop().unwrap(), (last + 1) as u64);

    let chunks = stores.query("Probe 1", "Temp", T0, i64::MAX, Resolution::Compacted).unwrap();
    assert_eq!(chunks.len(), 1);
    let c = chunks[0];
    assert_eq!(c.timestamp_ms, T0 + CHUNK_MS);

    let raw = stores.query("Probe 1", "Temp", T0, T0 + CHUNK_MS, Resolution::Raw).unwrap();
    let lo = raw.iter().map(|r| r.value).fold(f64::INFINITY, f64::min);
    let hi = raw.iter().map(|r| r.value).fold(f64::NEG_INFINITY, f64::max);
    assert!((c.min - lo).abs() < 1e-9 && (c.max - hi).abs() < 1e-9);
    assert!(lo <= c.value && c.value <= hi);
}

#[test]
fn live_subscribers_see_what_is_stored() {
    let dir = tempfile::tempdir().unwrap();
    let stores = Arc::new(StoreRegistry::open(dir.path(), &descriptions(), &policy(dir.path(), 20)).unwrap());
    let mut live = LiveStream::new(100);
    let fast = live.subscribe();
    let (tx, rx) = crossbeam_channel::bounded(100);
    let monitor = Monitor::spawn(rx, stores.clone(), vec![Box::new(live)], Duration::from_millis(5)).unwrap();

    for k in 0..10 {
        tx.send(sample(T0 + k * PERIOD_MS, value(k))).unwrap();
    }
    monitor.stop().unwrap();

    let seen: Vec<i64> = fast.try_iter().map(|s| s.timestamp_ms()).collect();
    let stored: Vec<i64> = stores
        .query("Probe 1", "Temp", 0, i64::MAX, Resolution::Raw)
        .unwrap()
        .iter()
        .map(|r| r.timestamp_ms)
        .collect();
    assert_eq!(seen, stored);
}

#[test]
fn reopened_store_keeps_history_and_multiplier() {
    let dir = tempfile::tempdir().unwrap();
    {
        let stores = StoreRegistry::open(dir.path(), &descriptions(), &policy(dir.path(), 20)).unwrap();
        stores.record(&sample(T0, 21.25)).unwrap();
        // Dropped without an explicit flush.
    }
    let mut changed = descriptions();
    changed.get_mut("Probe 1").unwrap().get_mut("Temp").unwrap().category = Category::Unknown;
    let stores = StoreRegistry::open(dir.path(), &changed, &policy(dir.path(), 20)).unwrap();
    assert_eq!(stores.store("Probe 1", "Temp").unwrap().multiplier(), 100.0);
    let rows = stores.query("Probe 1", "Temp", T0, T0, Resolution::Raw).unwrap();
    assert_eq!(rows.len(), 1);
    assert!((rows[0].value - 21.25).abs() < 1e-9);
}
