use thiserror::Error;
use wanderlore_protocol::{CryptoError, ProtocolError};

/// Errors that end a session or the server itself. Failures that get a
/// reply on the wire (bad credentials, unknown commands, store hiccups)
/// never surface here.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("handshake failed: {0}")]
    Handshake(CryptoError),
    #[error("session idle past the read deadline")]
    IdleTimeout,
}

pub type Result<T> = std::result::Result<T, ServerError>;
