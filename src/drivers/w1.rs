//! One-wire `w1_slave` reply parsing.
//!
//! The kernel w1-therm driver exposes each probe as a two-line file:
//!
//! ```text
//! 72 01 4b 46 7f ff 0e 10 57 : crc=57 YES
//! 72 01 4b 46 7f ff 0e 10 57 t=23125
//! ```
//!
//! The first line ends in `YES` when the CRC matched; the second carries
//! the temperature in millidegrees after `t=`.

use crate::error::HardwareError;

/// Parse a `w1_slave` reply into degrees Celsius.
///
/// [`HardwareError::ChecksumFailed`] means the read is worth retrying;
/// anything else is [`HardwareError::ReadFailed`].
pub fn parse_w1_slave(reply: &str) -> Result<f64, HardwareError> {
    let mut lines = reply.lines();
    let status = lines.next().ok_or(HardwareError::ReadFailed)?;
    if !status.trim_end().ends_with("YES") {
        return Err(HardwareError::ChecksumFailed);
    }
    let data = lines.next().ok_or(HardwareError::ReadFailed)?;
    let pos = data.find("t=").ok_or(HardwareError::ReadFailed)?;
    let milli: i64 = data[pos + 2..].trim().parse().map_err(|_| HardwareError::ReadFailed)?;
    Ok(milli as f64 / 1000.0)
}
