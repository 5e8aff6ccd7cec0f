//! Unified error types for the greenhouse controller.
//!
//! A single [`Error`] enum that every subsystem converts into, keeping the
//! call sites at the process edges uniform.  Hardware and schedule errors
//! are `Copy` so they can be passed through the task loops without
//! allocation; storage errors carry their source.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// A hardware read or write failed.
    Hardware(HardwareError),
    /// A schedule peg was rejected.
    Schedule(ScheduleError),
    /// A controller command could not be executed.
    Command(CommandError),
    /// Task registration or lifecycle failed.
    Task(TaskError),
    /// The time-series store failed (data loss on disk is possible).
    Storage(StorageError),
    /// A cross-thread channel timed out or was closed.
    Channel(ChannelError),
    /// Configuration is invalid or could not be loaded.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Schedule(e) => write!(f, "schedule: {e}"),
            Self::Command(e) => write!(f, "command: {e}"),
            Self::Task(e) => write!(f, "task: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Channel(e) => write!(f, "channel: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareError {
    /// The hardware handle has not been acquired (or was released).
    NotAcquired,
    /// The backend cannot perform this operation.
    Unsupported,
    /// The addressed device or file does not exist.
    DeviceNotFound,
    /// A read returned an error or garbage.
    ReadFailed,
    /// A pin or PWM write failed.
    WriteFailed,
    /// The device reported a bad checksum.
    ChecksumFailed,
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAcquired => write!(f, "hardware not acquired"),
            Self::Unsupported => write!(f, "operation not supported"),
            Self::DeviceNotFound => write!(f, "device not found"),
            Self::ReadFailed => write!(f, "read failed"),
            Self::WriteFailed => write!(f, "write failed"),
            Self::ChecksumFailed => write!(f, "checksum failed"),
        }
    }
}

impl std::error::Error for HardwareError {}

impl embedded_hal::digital::Error for HardwareError {
    fn kind(&self) -> embedded_hal::digital::ErrorKind {
        embedded_hal::digital::ErrorKind::Other
    }
}

impl embedded_hal::pwm::Error for HardwareError {
    fn kind(&self) -> embedded_hal::pwm::ErrorKind {
        embedded_hal::pwm::ErrorKind::Other
    }
}

impl From<HardwareError> for Error {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Schedule errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// Hour > 23 or minute > 59.
    InvalidTime,
    /// The schedule already holds its maximum number of pegs.
    Full,
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTime => write!(f, "invalid time of day"),
            Self::Full => write!(f, "schedule full"),
        }
    }
}

impl std::error::Error for ScheduleError {}

impl From<ScheduleError> for Error {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

// ---------------------------------------------------------------------------
// Command errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// No task with this source name is registered.
    UnknownTask(String),
    /// The command key is not recognised.
    UnknownCommand(String),
    /// The payload could not be parsed.
    InvalidPayload(&'static str),
    /// The addressed task does not accept this kind of command.
    Unsupported,
    /// Valve index out of range.
    InvalidValve(usize),
    /// The schedule rejected the peg.
    Schedule(ScheduleError),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownTask(name) => write!(f, "unknown task '{name}'"),
            Self::UnknownCommand(key) => write!(f, "unknown command '{key}'"),
            Self::InvalidPayload(msg) => write!(f, "invalid payload: {msg}"),
            Self::Unsupported => write!(f, "command not supported by this task"),
            Self::InvalidValve(i) => write!(f, "no valve with index {i}"),
            Self::Schedule(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CommandError {}

impl From<ScheduleError> for CommandError {
    fn from(e: ScheduleError) -> Self {
        Self::Schedule(e)
    }
}

impl From<CommandError> for Error {
    fn from(e: CommandError) -> Self {
        Self::Command(e)
    }
}

// ---------------------------------------------------------------------------
// Task errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum TaskError {
    /// Two tasks share a source name.
    DuplicateName(String),
    /// A slave names a master that is not registered.
    UnknownMaster(String),
    /// A slave was wired to a task that is itself a slave.
    NestedSlave(String),
    /// Tasks cannot be added or started twice.
    AlreadyStarted,
    /// The OS refused to create a thread.
    Spawn(std::io::Error),
    /// Hardware acquisition failed.
    Hardware(HardwareError),
    /// The acquisition side refused `START`.
    StartFailed(String),
    /// The configuration the tasks are built from is invalid.
    Config(ConfigError),
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName(name) => write!(f, "duplicate task name '{name}'"),
            Self::UnknownMaster(name) => write!(f, "unknown master task '{name}'"),
            Self::NestedSlave(name) => write!(f, "master '{name}' is itself a slave"),
            Self::AlreadyStarted => write!(f, "tasks already started"),
            Self::Spawn(e) => write!(f, "thread spawn failed: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::StartFailed(msg) => write!(f, "start failed: {msg}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for TaskError {}

impl From<HardwareError> for TaskError {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

impl From<ConfigError> for TaskError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<TaskError> for Error {
    fn from(e: TaskError) -> Self {
        Self::Task(e)
    }
}

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Storage failures are the one class that must surface to the owning
/// process: they imply lost data on disk.
#[derive(Debug)]
pub enum StorageError {
    /// The SQLite layer failed.
    Sql(rusqlite::Error),
    /// Creating the store directory failed.
    Io(std::io::Error),
    /// The persisted metadata record is unreadable.
    Metadata(String),
    /// No store exists for this `(source, parameter)`.
    UnknownParameter { source: String, parameter: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sql(e) => write!(f, "sqlite: {e}"),
            Self::Io(e) => write!(f, "I/O: {e}"),
            Self::Metadata(msg) => write!(f, "metadata: {msg}"),
            Self::UnknownParameter { source, parameter } => {
                write!(f, "no store for {source}/{parameter}")
            }
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Sql(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sql(e)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Channel errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// No reply within the allowed time.
    Timeout,
    /// The other side has gone away.
    Disconnected,
    /// A reply of the wrong kind came back.
    UnexpectedReply,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::UnexpectedReply => write!(f, "unexpected reply"),
        }
    }
}

impl std::error::Error for ChannelError {}

impl From<ChannelError> for Error {
    fn from(e: ChannelError) -> Self {
        Self::Channel(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// No config file exists.
    NotFound,
    /// The stored config failed deserialisation.
    Corrupted(String),
    /// A field failed range validation.
    ValidationFailed(&'static str),
    /// Generic I/O error from the config backend.
    Io(std::io::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "config not found"),
            Self::Corrupted(msg) => write!(f, "config corrupted: {msg}"),
            Self::ValidationFailed(msg) => write!(f, "validation failed: {msg}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
