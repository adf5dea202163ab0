use thiserror::Error;

use wanderlore_protocol::{CryptoError, ProtocolError};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// The server answered with an error reply.
    #[error("server error: {0}")]
    Server(String),

    /// The server answered, but with a reply of the wrong shape.
    #[error("unexpected reply to {0}")]
    UnexpectedReply(&'static str),

    #[error("not logged in")]
    NotLoggedIn,
}

pub type Result<T> = std::result::Result<T, ClientError>;
