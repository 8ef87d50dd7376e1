//! The serial link: one duplex byte channel owned by the session.

use std::io::{self, Read, Write};
use std::os::unix::io::AsRawFd;
use std::time::Duration;

use crate::error::{Result, SercomError};

/// Read timeout the serial driver applies once `poll` has said data is there.
const DRIVER_TIMEOUT: Duration = Duration::from_millis(100);

/// Anything that can stand in for the serial port: readable, writable and
/// pollable. Tests use Unix socket pairs.
pub trait Link: Read + Write + AsRawFd + Send {}

impl<T: Read + Write + AsRawFd + Send> Link for T {}

/// Open `device` at `baud` as a raw 8N1 serial port.
pub fn open(device: &str, baud: u32) -> Result<Box<dyn Link>> {
    let port = serialport::new(device, baud)
        .timeout(DRIVER_TIMEOUT)
        .open_native()
        .map_err(|source| SercomError::SerialOpen {
            device: device.to_string(),
            baud,
            source,
        })?;
    tracing::debug!("serial port {} configured at {} baud", device, baud);
    Ok(Box::new(port))
}

/// Write everything and push it out immediately.
pub fn send(link: &mut dyn Link, data: &[u8]) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    link.write_all(data)?;
    link.flush()
}
