//! Length-prefixed bincode framing over a TCP stream.
//!
//! Each frame is a 4-byte big-endian length followed by a bincode-encoded
//! [`Envelope`]. One `read_frame` call yields exactly one decoded message.
//! Malformed payloads are decode errors, never silent truncation; a peer
//! that sends one is treated as compromised and disconnected by the caller.

use crate::protocol::Envelope;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Upper bound on a single frame. Full snapshots are the largest messages
/// and stay far below this; anything bigger is a protocol violation.
pub const MAX_FRAME_LEN: usize = 4 * 1024 * 1024;

pub const LEN_PREFIX_BYTES: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[source] bincode::Error),
    #[error("failed to decode message: {0}")]
    Decode(#[source] bincode::Error),
    #[error("frame of {len} bytes exceeds limit of {MAX_FRAME_LEN}")]
    FrameTooLarge { len: usize },
    #[error("socket error: {0}")]
    Io(#[from] std::io::Error),
}

/// Encodes an envelope into a ready-to-send frame (prefix included).
pub fn encode(envelope: &Envelope) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(envelope).map_err(CodecError::Encode)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge { len: body.len() });
    }

    let mut frame = Vec::with_capacity(LEN_PREFIX_BYTES + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Decodes a frame body (prefix already stripped).
pub fn decode(body: &[u8]) -> Result<Envelope, CodecError> {
    bincode::deserialize(body).map_err(CodecError::Decode)
}

/// Writes one framed envelope. Blocks the calling task for the duration of
/// the write; the socket write half must not be shared without locking.
pub async fn write_frame<W>(writer: &mut W, envelope: &Envelope) -> Result<(), CodecError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(envelope)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one framed envelope. Returns `Ok(None)` on a clean end-of-stream
/// at a frame boundary; mid-frame EOF and undecodable bodies are errors.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Envelope>, CodecError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LEN_PREFIX_BYTES];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge { len });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode(&body).map(Some)
}
