//! Length-prefixed framing of [`Packet`]s over a byte stream.
//!
//! ```text
//! +-------------------+------------------------------+
//! | length (4 bytes)  | bincode-encoded Packet       |
//! | u32 little-endian | (length bytes)               |
//! +-------------------+------------------------------+
//! ```

use crate::error::FrameError;
use crate::protocol::{Packet, MAX_HANDSHAKE_FRAME, MAX_MESSAGE_SIZE};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Envelope overhead allowed on top of the largest message body.
const ENVELOPE_SLACK: u32 = 1024;

#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    /// Largest frame payload accepted, in bytes.
    pub max_frame_size: u32,
}

impl FrameConfig {
    /// Limit applied to the first frame of a connection, before admission.
    pub fn handshake() -> Self {
        Self {
            max_frame_size: MAX_HANDSHAKE_FRAME,
        }
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_MESSAGE_SIZE as u32 + ENVELOPE_SLACK,
        }
    }
}

/// Reads one frame. The length is checked before anything is allocated.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Vec<u8>, FrameError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(FrameError::ConnectionClosed);
        }
        Err(e) => return Err(FrameError::Io(e)),
    }

    let len = u32::from_le_bytes(len_buf);
    if len > config.max_frame_size {
        return Err(FrameError::TooLarge {
            size: len,
            max: config.max_frame_size,
        });
    }

    let mut payload = vec![0u8; len as usize];
    if len > 0 {
        reader.read_exact(&mut payload).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                FrameError::ConnectionClosed
            } else {
                FrameError::Io(e)
            }
        })?;
    }

    Ok(payload)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let len = u32::try_from(payload.len()).unwrap_or(u32::MAX);
    if len > config.max_frame_size {
        return Err(FrameError::TooLarge {
            size: len,
            max: config.max_frame_size,
        });
    }

    // Single write so a frame is never split by a concurrent flush.
    let mut buf = Vec::with_capacity(4 + payload.len());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(payload);
    writer.write_all(&buf).await?;
    writer.flush().await?;

    Ok(())
}

pub async fn read_packet<R: AsyncRead + Unpin>(
    reader: &mut R,
    config: &FrameConfig,
) -> Result<Packet, FrameError> {
    let frame = read_frame(reader, config).await?;
    Ok(bincode::deserialize(&frame)?)
}

pub async fn write_packet<W: AsyncWrite + Unpin>(
    writer: &mut W,
    packet: &Packet,
    config: &FrameConfig,
) -> Result<(), FrameError> {
    let data = bincode::serialize(packet)?;
    write_frame(writer, &data, config).await
}
