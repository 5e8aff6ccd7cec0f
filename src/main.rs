//! Greenhouse controller entry point.
//!
//! ```text
//! ┌──────────────────────── acquisition thread ────────────────────────┐
//! │  Probe 1 · DHT1 · Moisture · Heater · Grow Lights · Sprinkler      │
//! │        │ (one thread per task, shared output queue)                │
//! │        ▼                                                           │
//! │  AcquisitionService ── shared buffer                               │
//! └────────┬──────────────────────────────────────▲────────────────────┘
//!          │ data channel                         │ control channel
//!          ▼                                      │
//! ┌────────────────── consumer (this thread + monitor) ────────────────┐
//! │  Monitor ──▶ StoreRegistry (SQLite per parameter)                  │
//! │          ──▶ LiveStream · LogSampleSink                            │
//! │  stdin ──▶ AcquisitionClient::command                              │
//! └────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Usage: `greenhouse [config.json]`.  Stdin lines of the form
//! `source|KEY|payload` are sent as controller commands; `q` quits.

use std::io::BufRead;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use crossbeam_channel::RecvTimeoutError;
use log::{error, info, warn};

use greenhouse::adapters::config_file::JsonConfigStore;
use greenhouse::adapters::live::LiveStream;
use greenhouse::adapters::log_sink::LogSampleSink;
use greenhouse::app::commands::TaskCommand;
use greenhouse::app::ports::SampleSink;
use greenhouse::monitor::Monitor;
use greenhouse::rpc::client::AcquisitionClient;
use greenhouse::storage::StoreRegistry;
use greenhouse::task::spawn::{DEFAULT_STACK_KB, spawn_named};

const DEFAULT_CONFIG: &str = "greenhouse.json";
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

fn main() -> Result<()> {
    // ── 1. Logging ────────────────────────────────────────────
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Greenhouse v{}", env!("CARGO_PKG_VERSION"));

    // ── 2. Configuration ──────────────────────────────────────
    let path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG.to_owned());
    let config = JsonConfigStore::new(&path)
        .load_or_default()
        .with_context(|| format!("loading {path}"))?;

    // ── 3. Acquisition side ───────────────────────────────────
    let mut client = AcquisitionClient::from_config(&config).context("spawning acquisition side")?;
    let descriptions = client
        .describe(Duration::from_secs(config.describe_timeout_secs))
        .context("description query")?;
    for (source, params) in &descriptions {
        info!("{source}: {}", params.keys().cloned().collect::<Vec<_>>().join(", "));
    }

    // ── 4. Storage + monitor ──────────────────────────────────
    let stores = Arc::new(
        StoreRegistry::open(&config.storage.dir, &descriptions, &config.storage).context("opening stores")?,
    );
    // Subscribers would attach here; the console gets the log sink.
    let live = LiveStream::new(config.live_stream_capacity);
    let sinks: Vec<Box<dyn SampleSink>> = vec![Box::new(live), Box::new(LogSampleSink::new())];
    let monitor = Monitor::spawn(
        client.data(),
        stores.clone(),
        sinks,
        Duration::from_millis(config.monitor_poll_ms),
    )
    .context("spawning monitor")?;

    client.start(COMMAND_TIMEOUT).context("START")?;
    info!("All tasks running");

    // ── 5. Operator loop ──────────────────────────────────────
    let (line_tx, lines) = crossbeam_channel::bounded::<String>(16);
    spawn_named("stdin", DEFAULT_STACK_KB, move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    })
    .context("spawning stdin reader")?;

    let deadline = config.run_secs.map(|s| Instant::now() + Duration::from_secs(s));
    loop {
        if monitor.is_finished() {
            warn!("Monitor ended early");
            break;
        }
        let wait = deadline.map_or(Duration::from_millis(500), |d| {
            d.saturating_duration_since(Instant::now()).min(Duration::from_millis(500))
        });
        match lines.recv_timeout(wait) {
            Ok(line) => match line.trim() {
                "" => {}
                "q" | "quit" => break,
                cmd => operator_command(&mut client, cmd),
            },
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                info!("stdin closed");
                if deadline.is_none() {
                    break;
                }
                // Keep running until the deadline.
                std::thread::sleep(wait);
            }
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            info!("Run time elapsed");
            break;
        }
    }

    // ── 6. Shutdown ───────────────────────────────────────────
    client.terminate();
    let stopped = monitor.stop();
    stores.flush_all().context("final flush")?;
    match stopped {
        Ok(n) => info!("Shutdown complete, {n} samples stored"),
        Err(e) => {
            error!("Samples were lost: {e}");
            bail!(e);
        }
    }
    Ok(())
}

/// `source|KEY|payload` → controller command, reply logged.
fn operator_command(client: &mut AcquisitionClient, line: &str) {
    let mut parts = line.splitn(3, '|');
    let (Some(source), Some(key)) = (parts.next(), parts.next()) else {
        warn!("Expected source|KEY|payload, got '{line}'");
        return;
    };
    let payload = parts.next().unwrap_or("");
    let command = match TaskCommand::from_wire(key.trim(), payload.trim()) {
        Ok(c) => c,
        Err(e) => {
            warn!("{key}: {e}");
            return;
        }
    };
    match client.command(source.trim(), command, COMMAND_TIMEOUT) {
        Ok(reply) => info!(
            "{source}|{key} → {}",
            serde_json::to_string(&reply).unwrap_or_else(|e| format!("<{e}>"))
        ),
        Err(e) => warn!("{source}|{key} failed: {e}"),
    }
}
