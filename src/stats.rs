//! Summary counters returned to the caller once a transfer finishes.

/// Outcome of a successful [`crate::sender::SenderFsm::transmit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct TransmitStats {
    pub bytes_sent: usize,
    pub segments: usize,
    pub retransmissions: usize,
    pub duration_ns: u128,
}

/// Outcome of a successful [`crate::receiver::ReceiverFsm::receive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ReceiveStats {
    pub bytes_received: usize,
    pub segments: usize,
    pub duration_ns: u128,
}
