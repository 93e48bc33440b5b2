//! A byte-oriented duplex channel with a configurable read timeout.
//!
//! [`SerialLink`] is the trait the rest of the crate programs against; it is
//! implemented for a real [`serialport::SerialPort`] by [`SerialPortLink`],
//! and by an in-memory loopback pair in tests so the FSMs can be exercised
//! without a device node.

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::error::LinkError;

/// Default read timeout before the protocol has synchronized.
pub const INITIAL_READ_TIMEOUT: Duration = Duration::from_secs(1);
/// Elevated read timeout used once a transfer is underway and the endpoint
/// is waiting on the peer's retransmission-request turnaround.
pub const RETRANSMISSION_TIMEOUT: Duration = Duration::from_secs(10);

/// A duplex byte channel: open, read-until-delimiter with a timeout, write,
/// close. Implemented for the real serial port and for test doubles.
pub trait SerialLink: Send {
    /// Writes every byte of `bytes`, failing with [`LinkError::LinkIo`] on
    /// any short write or I/O error.
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError>;

    /// Reads bytes until `delimiter` is observed or the configured read
    /// timeout expires. On timeout, returns whatever was accumulated so far
    /// (which may be empty) rather than failing — a timed-out read is a
    /// normal, expected outcome of this protocol, not an I/O error.
    fn read_until(&mut self, delimiter: &[u8], max_bytes: usize) -> Result<Vec<u8>, LinkError>;

    /// Changes the timeout used by subsequent [`SerialLink::read_until`] calls.
    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), LinkError>;
}

/// A [`SerialLink`] backed by a real serial device node via `serialport`.
pub struct SerialPortLink {
    port: Box<dyn serialport::SerialPort>,
    read_timeout: Duration,
}

impl SerialPortLink {
    /// Opens `port_name` at `baud_rate`, 8 data bits, no parity, one stop bit
    /// — the framing the radio's UART expects. Fails with
    /// [`LinkError::LinkUnavailable`] if the device node does not exist.
    pub fn open(port_name: &str, baud_rate: u32) -> Result<Self, LinkError> {
        let port = serialport::new(port_name, baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(INITIAL_READ_TIMEOUT)
            .open()
            .map_err(|e| match e.kind {
                serialport::ErrorKind::NoDevice => LinkError::LinkUnavailable(port_name.to_string()),
                _ => LinkError::LinkUnavailable(format!("{port_name}: {e}")),
            })?;
        log::debug!("opened {port_name} at {baud_rate} baud");
        Ok(SerialPortLink {
            port,
            read_timeout: INITIAL_READ_TIMEOUT,
        })
    }

    /// Releases the port. Dropping a `SerialPortLink` has the same effect;
    /// this exists so callers can make the release point explicit.
    pub fn close(self) {
        drop(self);
    }
}

impl SerialLink for SerialPortLink {
    fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
        self.port.write_all(bytes).map_err(LinkError::LinkIo)
    }

    fn read_until(&mut self, delimiter: &[u8], max_bytes: usize) -> Result<Vec<u8>, LinkError> {
        let deadline = Instant::now() + self.read_timeout;
        let mut acc = Vec::new();
        let mut byte = [0u8; 1];
        while acc.len() < max_bytes && Instant::now() < deadline {
            match self.port.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => {
                    acc.push(byte[0]);
                    if acc.ends_with(delimiter) {
                        break;
                    }
                }
                Err(e) if e.kind() == ErrorKind::TimedOut => break,
                Err(e) => return Err(LinkError::LinkIo(e)),
            }
        }
        Ok(acc)
    }

    fn set_read_timeout(&mut self, timeout: Duration) -> Result<(), LinkError> {
        self.read_timeout = timeout;
        self.port
            .set_timeout(timeout)
            .map_err(|e| LinkError::LinkIo(std::io::Error::new(ErrorKind::Other, e)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use super::SerialLink;
    use crate::error::LinkError;

    /// A [`SerialLink`] whose reads are served from a pre-programmed script
    /// of canned responses, one per call; once exhausted, further reads
    /// behave like a timed-out read (empty). Writes are recorded for
    /// assertions.
    #[derive(Default)]
    pub(crate) struct ScriptedLink {
        pub(crate) responses: VecDeque<Vec<u8>>,
        pub(crate) written: Vec<Vec<u8>>,
    }

    impl ScriptedLink {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        pub(crate) fn with_responses(responses: Vec<&[u8]>) -> Self {
            ScriptedLink {
                responses: responses.into_iter().map(|r| r.to_vec()).collect(),
                written: Vec::new(),
            }
        }
    }

    impl SerialLink for ScriptedLink {
        fn write_all(&mut self, bytes: &[u8]) -> Result<(), LinkError> {
            self.written.push(bytes.to_vec());
            Ok(())
        }

        fn read_until(&mut self, _delimiter: &[u8], _max_bytes: usize) -> Result<Vec<u8>, LinkError> {
            Ok(self.responses.pop_front().unwrap_or_default())
        }

        fn set_read_timeout(&mut self, _timeout: Duration) -> Result<(), LinkError> {
            Ok(())
        }
    }
}
