//! Serial connection to the sensor board.

use std::io::{self, BufRead, BufReader};

use log::{info, warn};
use serialport::SerialPort;

use crate::config::SerialConfig;
use crate::errors::{CaptureError, Result};

/// Line-oriented byte source read by the acquisition loop.
pub trait LineSource {
    /// Block for at most the read timeout. Returns `Ok(None)` when the
    /// timeout elapses without a complete line.
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>>;
}

/// Exclusive handle to an opened serial device, released on drop.
pub struct SerialLink {
    path: String,
    reader: BufReader<Box<dyn SerialPort>>,
    pending: Vec<u8>,
}

impl SerialLink {
    /// Open the first candidate path that accepts the connection.
    pub fn open_first(config: &SerialConfig) -> Result<Self> {
        for path in &config.candidates {
            match Self::open(path, config) {
                Ok(link) => {
                    info!("Successfully connected to {}", path);
                    return Ok(link);
                }
                Err(e) => warn!("Failed to connect to {}: {}", path, e),
            }
        }
        Err(CaptureError::Connection {
            tried: config.candidates.join(", "),
        })
    }

    fn open(path: &str, config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(path, config.baud_rate)
            .parity(config.parity.into())
            .stop_bits(config.stop_bits.into())
            .data_bits(config.data_bits.into())
            .timeout(config.timeout())
            .open()?;

        Ok(Self {
            path: path.to_string(),
            reader: BufReader::new(port),
            pending: Vec::with_capacity(128),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl LineSource for SerialLink {
    fn read_line(&mut self) -> io::Result<Option<Vec<u8>>> {
        match self.reader.read_until(b'\n', &mut self.pending) {
            // Partial bytes stay in `pending` until the terminator arrives.
            Ok(_) if self.pending.last() == Some(&b'\n') => {
                Ok(Some(std::mem::take(&mut self.pending)))
            }
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl Drop for SerialLink {
    fn drop(&mut self) {
        info!("Released serial port {}", self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unreachable_candidates_are_connection_error() {
        let config = SerialConfig {
            candidates: vec![
                "/nonexistent/ttyIMU0".to_string(),
                "/nonexistent/ttyIMU1".to_string(),
            ],
            ..SerialConfig::default()
        };
        match SerialLink::open_first(&config) {
            Err(CaptureError::Connection { tried }) => {
                assert_eq!(tried, "/nonexistent/ttyIMU0, /nonexistent/ttyIMU1");
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("opened a nonexistent device"),
        }
    }
}
