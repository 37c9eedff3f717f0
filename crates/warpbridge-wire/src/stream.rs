//! Async framed reads and writes over byte streams.

use crate::frame::{decode_frame, decode_length, encode_frame, RelayFrame, MAX_FRAME_SIZE};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Errors from the framing layer.
#[derive(Debug, Error)]
pub enum WireError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Connection closed")]
    ConnectionClosed,
    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },
}

/// Write a framed message (4-byte length + JSON) to a stream.
///
/// An oversized frame fails with [`WireError::FrameTooLarge`] before any byte
/// is written, so the stream stays usable.
pub async fn write_frame<W>(writer: &mut W, frame: &RelayFrame) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
{
    let bytes = encode_frame(frame)?;
    writer.write_all(&bytes).await?;
    writer.flush().await?;
    trace!(frame_id = %frame.id, len = bytes.len(), "Wrote frame");
    Ok(())
}

/// Read a framed message (4-byte length + JSON) from a stream.
pub async fn read_frame<R>(reader: &mut R) -> Result<RelayFrame, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed);
        }
        Err(e) => return Err(WireError::Io(e)),
    }

    let len = decode_length(&header);
    if len > MAX_FRAME_SIZE {
        return Err(WireError::FrameTooLarge {
            size: len as usize,
            max: MAX_FRAME_SIZE as usize,
        });
    }

    let mut body = vec![0u8; len as usize];
    reader.read_exact(&mut body).await?;

    let frame = decode_frame(&body)?;
    trace!(frame_id = %frame.id, len, "Read frame");
    Ok(frame)
}
