use thiserror::Error;

/// Errors emitted while framing or decoding wire messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed")]
    ConnectionClosed,
    #[error("frame of {0} bytes exceeds the frame limit")]
    FrameTooLarge(usize),
    #[error("frame decode error: {0}")]
    Frame(#[from] bincode::Error),
    #[error("envelope decode error: {0}")]
    Envelope(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
