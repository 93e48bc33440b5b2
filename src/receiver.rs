//! The synchronize-accumulate-repair loop driven by the receiving endpoint.

use std::collections::HashMap;
use std::thread::sleep;
use std::time::Instant;

use crate::at_adapter::AtAdapter;
use crate::codec::{self, NackFrame, TransmissionHeader, NACK_TAG, STRAY_PREAMBLE_SEQ};
use crate::error::ReceiveError;
use crate::link::{SerialLink, INITIAL_READ_TIMEOUT, RETRANSMISSION_TIMEOUT};
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink};
use crate::sender::RX_SWITCH_DELAY;
use crate::stats::ReceiveStats;
use crate::MAX_RETRIES;

/// Drives reception of one transfer from `SyncHunt` through `Accumulate`,
/// `RepairPhase`, `AckPhase`, and into `Done`.
pub struct ReceiverFsm<L: SerialLink> {
    adapter: AtAdapter<L>,
}

impl<L: SerialLink> ReceiverFsm<L> {
    pub fn new(link: L) -> Self {
        ReceiverFsm {
            adapter: AtAdapter::new(link),
        }
    }

    pub fn into_link(self) -> L {
        self.adapter.into_link()
    }

    /// Synchronizes on the transmission preamble, accumulates chunks,
    /// repairs gaps, acknowledges, and returns the reassembled payload along
    /// with the opaque `width`/`height` and reception statistics.
    pub fn receive(
        &mut self,
        cancel: &CancelFlag,
        progress: &mut dyn ProgressSink,
    ) -> Result<(Vec<u8>, u32, u32, ReceiveStats), ReceiveError> {
        let start = Instant::now();

        progress.on_event(ProgressEvent::StateEntered("SyncHunt"));
        self.adapter.link_mut().set_read_timeout(INITIAL_READ_TIMEOUT)?;
        self.adapter.arm_receive()?;

        let (header, chunk_count, mut leftover) = loop {
            if cancel.is_cancelled() {
                progress.on_event(ProgressEvent::StateEntered("Cancelled"));
                return Err(ReceiveError::Cancelled);
            }
            let frame = self.adapter.poll_receive()?;
            if frame.len() < codec::TRANSMISSION_HEADER_SIZE {
                continue;
            }
            let Some((header, remainder)) = TransmissionHeader::decode(&frame) else {
                log::trace!("dropping frame with bad preamble, staying in SyncHunt");
                continue;
            };
            let chunk_count = codec::chunk_count(header.total_body_bytes as usize);
            log::debug!(
                "synchronized: {}x{} image, {} byte(s) over {chunk_count} chunk(s)",
                header.width,
                header.height,
                header.total_body_bytes
            );
            break (header, chunk_count, remainder.to_vec());
        };

        progress.on_event(ProgressEvent::StateEntered("Accumulate"));
        self.adapter.link_mut().set_read_timeout(RETRANSMISSION_TIMEOUT)?;

        let mut received: HashMap<u16, Vec<u8>> = HashMap::new();
        let mut bytes_received = 0usize;
        let mut retries_left = MAX_RETRIES;

        loop {
            if !leftover.is_empty() {
                let frame = std::mem::take(&mut leftover);
                accept_chunk(&frame, chunk_count, &mut received, &mut bytes_received, progress);
            } else {
                if cancel.is_cancelled() {
                    progress.on_event(ProgressEvent::StateEntered("Cancelled"));
                    return Err(ReceiveError::Cancelled);
                }
                let frame = self.adapter.poll_receive()?;
                if frame.is_empty() {
                    if received.len() == chunk_count {
                        break;
                    }
                    progress.on_event(ProgressEvent::StateEntered("RepairPhase"));
                    if retries_left == 0 {
                        log::warn!(
                            "retry budget exhausted with {} chunk(s) still missing",
                            chunk_count - received.len()
                        );
                        return Err(ReceiveError::RetryExhausted {
                            missing: chunk_count - received.len(),
                        });
                    }
                    let missing: Vec<u16> = (0..chunk_count as u16)
                        .filter(|seq| !received.contains_key(seq))
                        .collect();
                    log::debug!("read timeout with {} chunk(s) missing: {:?}", missing.len(), missing);
                    progress.on_event(ProgressEvent::RepairRequested {
                        missing: missing.clone(),
                    });
                    sleep(RX_SWITCH_DELAY);
                    self.adapter.transmit(&NackFrame::missing(missing).encode(), true)?;
                    self.adapter.arm_receive()?;
                    retries_left -= 1;
                    progress.on_event(ProgressEvent::StateEntered("Accumulate"));
                    continue;
                }
                if frame.starts_with(&NACK_TAG) {
                    // Receiver never consumes its own NACKs/ACKs.
                    continue;
                }
                accept_chunk(&frame, chunk_count, &mut received, &mut bytes_received, progress);
            }

            if received.len() == chunk_count {
                break;
            }
        }

        log::debug!("all {chunk_count} chunk(s) accounted for, entering AckPhase");
        progress.on_event(ProgressEvent::StateEntered("AckPhase"));
        sleep(RX_SWITCH_DELAY);
        self.adapter.transmit(&NackFrame::ack().encode(), true)?;
        progress.on_event(ProgressEvent::Acknowledged);

        progress.on_event(ProgressEvent::StateEntered("Done"));
        let mut payload = Vec::with_capacity(header.total_body_bytes as usize);
        for seq in 0..chunk_count as u16 {
            if let Some(body) = received.get(&seq) {
                payload.extend_from_slice(body);
            }
        }
        payload.truncate(header.total_body_bytes as usize);

        let stats = ReceiveStats {
            bytes_received,
            segments: received.len(),
            duration_ns: start.elapsed().as_nanos(),
        };
        Ok((payload, header.width, header.height, stats))
    }
}

/// Applies the Accumulate-state chunk acceptance policy: drop out-of-range
/// or stray-preamble sequence numbers, never overwrite an already-received
/// chunk, and tally bytes.
fn accept_chunk(
    frame: &[u8],
    chunk_count: usize,
    received: &mut HashMap<u16, Vec<u8>>,
    bytes_received: &mut usize,
    progress: &mut dyn ProgressSink,
) {
    let Some((seq, body)) = codec::decode_chunk(frame) else {
        return;
    };
    if seq == STRAY_PREAMBLE_SEQ || seq as usize >= chunk_count {
        log::trace!("dropping corrupt/stray sequence number {seq}");
        return;
    }
    if received.contains_key(&seq) {
        log::trace!("ignoring duplicate chunk {seq}");
        return;
    }
    received.insert(seq, body.to_vec());
    *bytes_received += 2 + body.len();
    progress.on_event(ProgressEvent::ChunkReceived {
        seq,
        received: received.len(),
        total: chunk_count,
    });
}
