use thiserror::Error;

/// Errors raised while opening or driving the underlying byte channel.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LinkError {
    #[error("serial device unavailable: {0}")]
    LinkUnavailable(String),
    #[error("serial I/O error: {0}")]
    LinkIo(#[from] std::io::Error),
}

/// Errors raised while pushing the radio through its AT command shell.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AtError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error("radio rejected configuration line {line:?}: {response}")]
    ConfigRejected { line: String, response: String },
}

/// Errors returned from [`crate::config::RfConfig::new`].
#[derive(Debug, Error, PartialEq, Eq, Clone)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("spreading factor {0} out of range [6, 14]")]
    SpreadingFactorOutOfRange(u32),
    #[error("bandwidth {0} kHz is not one of 250, 500")]
    UnsupportedBandwidth(u32),
    #[error("power {0} dBm out of range [13, 22]")]
    PowerOutOfRange(u32),
    #[error("baud rate {0} is not a supported UART rate")]
    UnsupportedBaudRate(u32),
}

/// Terminal outcomes of [`crate::sender::SenderFsm::transmit`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransmitError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Config(#[from] AtError),
    #[error("payload of {chunks} chunks exceeds the 16-bit sequence space")]
    PayloadTooLarge { chunks: usize },
    #[error("retransmission retries exhausted with {missing} chunk(s) still missing")]
    RetryExhausted { missing: usize },
    #[error("transmission cancelled")]
    Cancelled,
}

/// Terminal outcomes of [`crate::receiver::ReceiverFsm::receive`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReceiveError {
    #[error(transparent)]
    Link(#[from] LinkError),
    #[error(transparent)]
    Config(#[from] AtError),
    #[error("retransmission retries exhausted with {missing} chunk(s) still missing")]
    RetryExhausted { missing: usize },
    #[error("reception cancelled")]
    Cancelled,
}
