use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtocolError;
use crate::messages::Datagram;

/// Upper bound on a reliable-channel frame.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Upper bound on an unreliable-channel datagram, receive buffer included.
pub const MAX_DATAGRAM_LEN: usize = 8 * 1024;

/// Read a length-prefixed bincode frame from a stream.
pub async fn read_frame<S, T>(stream: &mut S) -> Result<T, ProtocolError>
where
    S: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    read_exact(stream, &mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(len));
    }

    let mut data = vec![0u8; len];
    read_exact(stream, &mut data).await?;

    Ok(bincode::deserialize(&data)?)
}

/// Serialize a frame with a length prefix and send it over the stream.
pub async fn write_frame<S, T>(stream: &mut S, message: &T) -> Result<(), ProtocolError>
where
    S: AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(message)?;
    if data.len() > MAX_FRAME_LEN {
        return Err(ProtocolError::FrameTooLarge(data.len()));
    }
    let len = (data.len() as u32).to_be_bytes();

    stream.write_all(&len).await?;
    stream.write_all(&data).await?;
    stream.flush().await?;

    Ok(())
}

/// Encode an unreliable-channel envelope as JSON bytes.
pub fn encode_datagram(datagram: &Datagram) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(datagram)?)
}

/// Decode a JSON envelope received off the unreliable channel.
pub fn decode_datagram(bytes: &[u8]) -> Result<Datagram, ProtocolError> {
    Ok(serde_json::from_slice(bytes)?)
}

async fn read_exact<S>(stream: &mut S, buf: &mut [u8]) -> Result<(), ProtocolError>
where
    S: AsyncRead + Unpin,
{
    match stream.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => {
            Err(ProtocolError::ConnectionClosed)
        }
        Err(err) => Err(ProtocolError::Io(err)),
    }
}
