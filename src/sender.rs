//! The transmit-then-repair loop driven by the sending endpoint.

use std::thread::sleep;
use std::time::Instant;

use rand::Rng;

use crate::at_adapter::AtAdapter;
use crate::codec::{self, NackFrame, CHUNK_SIZE, MAX_CHUNK_COUNT};
use crate::error::TransmitError;
use crate::link::{SerialLink, RETRANSMISSION_TIMEOUT};
use crate::progress::{CancelFlag, ProgressEvent, ProgressSink};
use crate::stats::TransmitStats;
use crate::MAX_RETRIES;

/// Guard interval a half-duplex radio needs to switch from TX to RX before
/// it can be trusted to observe the peer's next frame.
pub const RX_SWITCH_DELAY: std::time::Duration = std::time::Duration::from_millis(500);

/// Diagnostic-only packet dropper for exercising the repair path. Never
/// wired into [`SenderFsm::transmit`] unless the caller explicitly attaches
/// one via [`SenderFsm::with_loss_simulator`] — it has no bearing on the
/// wire protocol, which is identical whether or not a chunk was dropped.
pub struct LossSimulator {
    probability: f64,
}

impl LossSimulator {
    /// `probability` is the chance, in `[0.0, 1.0]`, that a non-header chunk
    /// is silently dropped before it would have been handed to the adapter.
    pub fn new(probability: f64) -> Self {
        LossSimulator {
            probability: probability.clamp(0.0, 1.0),
        }
    }

    fn should_drop(&self) -> bool {
        rand::rng().random_bool(self.probability)
    }
}

/// Drives one payload from `Idle` through `Burst`, `AwaitRepair`, and into a
/// terminal state (`Complete`, `Cancelled`, or `Exhausted` surfaced as
/// [`TransmitError::RetryExhausted`]).
pub struct SenderFsm<L: SerialLink> {
    adapter: AtAdapter<L>,
    loss_simulator: Option<LossSimulator>,
}

impl<L: SerialLink> SenderFsm<L> {
    pub fn new(link: L) -> Self {
        SenderFsm {
            adapter: AtAdapter::new(link),
            loss_simulator: None,
        }
    }

    pub fn with_loss_simulator(mut self, simulator: LossSimulator) -> Self {
        self.loss_simulator = Some(simulator);
        self
    }

    pub fn into_link(self) -> L {
        self.adapter.into_link()
    }

    /// Transmits `payload` (with opaque `width`/`height`) and drives the
    /// repair loop to completion, cancellation, or retry exhaustion.
    pub fn transmit(
        &mut self,
        payload: &[u8],
        width: u32,
        height: u32,
        cancel: &CancelFlag,
        progress: &mut dyn ProgressSink,
    ) -> Result<TransmitStats, TransmitError> {
        let start = Instant::now();
        let chunk_count = codec::chunk_count(payload.len());
        if chunk_count == 0 || chunk_count > MAX_CHUNK_COUNT {
            return Err(TransmitError::PayloadTooLarge { chunks: chunk_count });
        }

        let mut stats = TransmitStats {
            segments: chunk_count,
            ..Default::default()
        };

        log::debug!("Burst: transmitting {chunk_count} chunk(s), {} byte(s)", payload.len());
        progress.on_event(ProgressEvent::StateEntered("Burst"));
        // total_body_bytes is informational only: both endpoints derive the
        // chunk count from payload length and CHUNK_SIZE directly, so this
        // field only feeds the receiver's progress/logging display.
        let total_body_bytes = payload.len() as u32;

        for seq in 0..chunk_count as u16 {
            if cancel.is_cancelled() {
                progress.on_event(ProgressEvent::StateEntered("Cancelled"));
                return Err(TransmitError::Cancelled);
            }

            let start_byte = seq as usize * CHUNK_SIZE;
            let end_byte = (start_byte + CHUNK_SIZE).min(payload.len());
            let body = &payload[start_byte..end_byte];

            if seq != 0 {
                if let Some(sim) = &self.loss_simulator {
                    if sim.should_drop() {
                        log::trace!("loss simulator dropping chunk {seq}");
                        continue;
                    }
                }
            }

            let frame = if seq == 0 {
                codec::encode_first(body, width, height, total_body_bytes)
            } else {
                codec::encode(seq, body)
            };

            // Chunk 0 carries the transmission header; losing it strands the
            // receiver outside any session, so it is sent three times total.
            let copies = if seq == 0 { 3 } else { 1 };
            for copy in 0..copies {
                self.adapter.transmit(&frame, true)?;
                stats.bytes_sent += frame.len();
                if copy > 0 {
                    stats.retransmissions += 1;
                }
                progress.on_event(ProgressEvent::ChunkSent { seq });
            }
        }

        log::debug!("Burst complete, entering AwaitRepair");
        progress.on_event(ProgressEvent::StateEntered("AwaitRepair"));
        self.adapter.link_mut().set_read_timeout(RETRANSMISSION_TIMEOUT / 2)?;

        let mut retries_left = MAX_RETRIES;
        let mut last_missing_count = 0usize;
        loop {
            if retries_left == 0 {
                log::warn!("retry budget exhausted with {last_missing_count} chunk(s) still missing");
                return Err(TransmitError::RetryExhausted {
                    missing: last_missing_count,
                });
            }
            if cancel.is_cancelled() {
                progress.on_event(ProgressEvent::StateEntered("Cancelled"));
                return Err(TransmitError::Cancelled);
            }

            self.adapter.arm_receive()?;
            let polled = self.adapter.poll_receive()?;
            let Some(nack) = NackFrame::decode(&polled) else {
                // Empty poll or a non-MISS line: record the tick against the
                // retry budget so a peer that never answers still exhausts
                // rather than spinning forever.
                retries_left -= 1;
                continue;
            };

            if nack.is_ack() {
                log::debug!("received ACK, transfer complete");
                progress.on_event(ProgressEvent::Acknowledged);
                progress.on_event(ProgressEvent::StateEntered("Complete"));
                stats.duration_ns = start.elapsed().as_nanos();
                return Ok(stats);
            }

            log::debug!("received MISS for {} chunk(s): {:?}", nack.seqs.len(), nack.seqs);
            progress.on_event(ProgressEvent::RepairRequested {
                missing: nack.seqs.clone(),
            });
            last_missing_count = nack.seqs.len();
            sleep(RX_SWITCH_DELAY);
            for seq in &nack.seqs {
                let start_byte = *seq as usize * CHUNK_SIZE;
                let end_byte = (start_byte + CHUNK_SIZE).min(payload.len());
                let body = &payload[start_byte..end_byte];
                let frame = if *seq == 0 {
                    codec::encode_first(body, width, height, total_body_bytes)
                } else {
                    codec::encode(*seq, body)
                };
                self.adapter.transmit(&frame, true)?;
                stats.bytes_sent += frame.len();
                stats.retransmissions += 1;
            }
            retries_left -= 1;
        }
    }
}
