//! Wanderlore wire protocol.
//!
//! Everything both sides of the connection agree on lives here: the framed
//! message types for the reliable channel, the JSON envelopes for the
//! unreliable channel, the length-prefixed frame codec, and the RSA-OAEP
//! session codec used to seal credentials during login and registration.

pub mod crypto;
pub mod error;
pub mod io;
pub mod messages;

pub use crypto::{CryptoError, KeyPair, PeerKey};
pub use error::ProtocolError;
pub use io::{
    decode_datagram, encode_datagram, read_frame, write_frame, MAX_DATAGRAM_LEN, MAX_FRAME_LEN,
};
pub use messages::{
    ClientCommand, Datagram, ErrorKind, Hello, HelloAck, PlayerEntry, RosterSnapshot, ServerReply,
    Story, StoryBatch,
};
