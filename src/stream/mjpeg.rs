//! MJPEG over HTTP (`multipart/x-mixed-replace`)
//!
//! Writes frames from a [`CameraReader`](crate::CameraReader) as multipart
//! parts to any async writer, typically an HTTP response body. The HTTP
//! server itself is not part of this crate; it sets [`MJPEG_CONTENT_TYPE`]
//! and hands its body writer to [`serve`].

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::mux::{CameraReader, StreamMultiplexer};
use crate::registry::Frame;

/// Multipart boundary token
pub const MJPEG_BOUNDARY: &str = "frame";

/// Response content type for an MJPEG stream
pub const MJPEG_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Headers preceding one JPEG part
pub fn part_header(len: usize) -> String {
    format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MJPEG_BOUNDARY, len
    )
}

/// Write one frame as a multipart part and flush
pub async fn write_part<W>(writer: &mut W, frame: &Frame) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(part_header(frame.len()).as_bytes()).await?;
    writer.write_all(frame.data()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

/// Stream camera frames to `writer` until cancelled
///
/// Subscribes first; an [`Error::Unavailable`](crate::Error::Unavailable)
/// means the camera could not be started and the caller should answer with a
/// server error. Otherwise frames are written until `cancel` fires, the
/// capture stream ends or a write fails. The reader is released on every
/// exit path. Returns the number of frames written.
pub async fn serve<W>(
    mux: &StreamMultiplexer,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut reader = mux.subscribe().await?;
    let id = reader.id();

    let written = forward(&mut reader, writer, cancel).await;
    let released = reader.release().await;

    match &written {
        Ok(frames) => tracing::debug!(subscription = %id, frames = frames, "MJPEG client finished"),
        Err(e) => tracing::debug!(subscription = %id, error = %e, "MJPEG client write failed"),
    }

    let frames = written?;
    released?;
    Ok(frames)
}

async fn forward<W>(
    reader: &mut CameraReader,
    writer: &mut W,
    cancel: &CancellationToken,
) -> Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut frames = 0;
    while let Some(frame) = reader.recv_until(cancel).await {
        write_part(writer, &frame).await?;
        frames += 1;
    }
    Ok(frames)
}
