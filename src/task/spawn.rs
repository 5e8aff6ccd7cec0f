//! Named worker threads.
//!
//! Every runner, the acquisition loop and the monitor get a thread named
//! after what they do, so they can be told apart in `htop` and `ps -L`.
//! Linux truncates thread names to 15 bytes; the full name still shows in
//! log lines and panic messages.

use std::io;
use std::thread::{self, JoinHandle};

/// Default stack for worker threads.
pub const DEFAULT_STACK_KB: usize = 256;

/// Spawn a named thread with an explicit stack size.
pub fn spawn_named<T, F>(name: &str, stack_kb: usize, f: F) -> io::Result<JoinHandle<T>>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    log::debug!("Spawning '{}' (stack={}KB)", name, stack_kb);
    thread::Builder::new()
        .name(name.to_owned())
        .stack_size(stack_kb * 1024)
        .spawn(f)
}
