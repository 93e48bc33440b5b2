//! Cooperative cancellation and progress reporting, shared between the FSMs
//! and whatever GUI/CLI collaborator drives them.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;

/// A boolean, atomically shared between the thread driving a FSM and the
/// thread (e.g. a UI) that wants to cancel it. Checked cooperatively at the
/// natural boundaries of each FSM loop — between chunks in `Burst`, between
/// polls in both FSMs — never preempted.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One state transition or repair event, textual by design so it can be
/// logged, displayed, or relayed without the sink knowing protocol internals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    /// Entered a new FSM state, named for logging (`"Burst"`, `"AwaitRepair"`, ...).
    StateEntered(&'static str),
    /// A chunk was handed to the adapter for transmission.
    ChunkSent { seq: u16 },
    /// A chunk's body was accepted into the receive buffer.
    ChunkReceived { seq: u16, received: usize, total: usize },
    /// A NACK naming missing sequence numbers was sent (sender side: received).
    RepairRequested { missing: Vec<u16> },
    /// The positive acknowledgement (zero-count NACK) was sent or received.
    Acknowledged,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::StateEntered(name) => write!(f, "entered {name}"),
            ProgressEvent::ChunkSent { seq } => write!(f, "sent chunk {seq}"),
            ProgressEvent::ChunkReceived { seq, received, total } => {
                write!(f, "received chunk {seq} ({received}/{total})")
            }
            ProgressEvent::RepairRequested { missing } => {
                write!(f, "requesting retransmission of {missing:?}")
            }
            ProgressEvent::Acknowledged => write!(f, "acknowledged"),
        }
    }
}

/// Receives progress events from a running FSM. Implementations must not
/// block for long — they are invoked synchronously on the FSM's thread.
pub trait ProgressSink {
    fn on_event(&mut self, event: ProgressEvent);
}

/// A no-op sink for callers that do not care about progress.
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_event(&mut self, _event: ProgressEvent) {}
}

impl<F: FnMut(ProgressEvent)> ProgressSink for F {
    fn on_event(&mut self, event: ProgressEvent) {
        self(event)
    }
}

/// A [`ProgressSink`] that forwards events over a `std::sync::mpsc` channel,
/// for callers (e.g. a GUI on another thread) that want a one-producer,
/// one-consumer queue rather than a callback.
pub struct ChannelSink(pub mpsc::Sender<ProgressEvent>);

impl ProgressSink for ChannelSink {
    fn on_event(&mut self, event: ProgressEvent) {
        // The receiver may have been dropped (UI closed); the FSM does not
        // fail a transfer just because nobody is listening anymore.
        let _ = self.0.send(event);
    }
}
