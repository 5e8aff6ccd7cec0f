//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter       | Implements   | Connects to                      |
//! |---------------|--------------|----------------------------------|
//! | `sim`         | HardwarePort | In-memory pins, files, I2C       |
//! | `sysfs`       | HardwarePort | gpio, pwm, w1, IIO, `/dev/i2c-N` |
//! | `log_sink`    | SampleSink   | `log` facade                     |
//! | `live`        | SampleSink   | Bounded subscriber channels      |
//! | `config_file` | ConfigPort   | JSON file on disk                |

pub mod config_file;
pub mod live;
pub mod log_sink;
pub mod sim;
pub mod sysfs;
