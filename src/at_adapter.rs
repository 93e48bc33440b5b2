//! Translates protocol-level frames to and from the radio's AT command shell.
//!
//! This layer knows the radio's textual syntax (`AT+TEST=...`, `+TEST: RX
//! "..."`, `TX DONE`) but nothing about chunk headers, sequence numbers, or
//! payload semantics — that belongs to [`crate::codec`].

use crate::error::AtError;
use crate::link::SerialLink;

const LINE_DELIMITER: &[u8] = b"\r\n";
/// Generous cap on a single AT response line; real lines are a few hundred
/// bytes at most (one hex-encoded 255-byte radio frame plus the `+TEST: RX
/// "..."`, `LEN:`, `RSSI:` wrapper).
const MAX_LINE_BYTES: usize = 4096;

pub struct AtAdapter<L: SerialLink> {
    link: L,
}

impl<L: SerialLink> AtAdapter<L> {
    pub fn new(link: L) -> Self {
        AtAdapter { link }
    }

    pub fn into_link(self) -> L {
        self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    /// Sends `script` line by line, reading one response per line. Any
    /// response containing `ERROR` is fatal.
    pub fn configure(&mut self, script: &[String]) -> Result<(), AtError> {
        for line in script {
            log::trace!("AT>> {line}");
            self.link.write_all(format!("{line}\n").as_bytes())?;
            let response = self.link.read_until(LINE_DELIMITER, MAX_LINE_BYTES)?;
            let response = String::from_utf8_lossy(&response).into_owned();
            log::trace!("AT<< {}", response.trim_end());
            if response.contains("ERROR") {
                log::warn!("radio rejected configuration line {line:?}: {response}");
                return Err(AtError::ConfigRejected {
                    line: line.clone(),
                    response,
                });
            }
        }
        Ok(())
    }

    /// Puts the radio into receive mode so it will emit `+TEST: RX "..."`
    /// lines as packets arrive.
    pub fn arm_receive(&mut self) -> Result<(), AtError> {
        self.link.write_all(b"AT+TEST=RXLRPKT\n")?;
        Ok(())
    }

    /// Transmits `frame`, hex-encoded, via `AT+TEST=TXLRPKT`. When
    /// `wait_done` is set, blocks until `TX DONE` is read or the link's read
    /// timeout expires (a timeout here is not an error: the caller's next
    /// action is what actually needs `TX DONE` to have happened, and a
    /// half-duplex radio that never answers is diagnosed by the FSM's own
    /// retry/timeout logic, not by this layer).
    pub fn transmit(&mut self, frame: &[u8], wait_done: bool) -> Result<(), AtError> {
        let command = format!("AT+TEST=TXLRPKT, \"{}\"\n", hex::encode_upper(frame));
        self.link.write_all(command.as_bytes())?;
        if wait_done {
            self.link.read_until(b"TX DONE\r\n", MAX_LINE_BYTES)?;
        }
        Ok(())
    }

    /// Reads one line and, if it contains one or more `RX "<HEX>"`
    /// occurrences, concatenates and hex-decodes them. Returns an empty
    /// vector (not an error) on a non-matching line, a timed-out read, or
    /// malformed hex — all three are "nothing arrived this poll".
    pub fn poll_receive(&mut self) -> Result<Vec<u8>, AtError> {
        let line = self.link.read_until(LINE_DELIMITER, MAX_LINE_BYTES)?;
        let line = String::from_utf8_lossy(&line);
        let hex_digits = extract_rx_hex(&line);
        if hex_digits.is_empty() {
            return Ok(Vec::new());
        }
        let decoded = hex::decode(&hex_digits).unwrap_or_else(|e| {
            log::warn!("dropping RX line with malformed hex: {e}");
            Vec::new()
        });
        log::trace!("AT<< RX {} byte(s)", decoded.len());
        Ok(decoded)
    }
}

/// Concatenates the hex payloads of every `RX "<HEX>"` occurrence in `line`.
fn extract_rx_hex(line: &str) -> String {
    let mut out = String::new();
    let mut rest = line;
    while let Some(start) = rest.find("RX \"") {
        let after = &rest[start + 4..];
        match after.find('"') {
            Some(end) => {
                out.push_str(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}
