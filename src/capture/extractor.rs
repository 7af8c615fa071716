//! JPEG frame extraction from a raw MJPEG byte stream
//!
//! The capture program writes back-to-back JPEG images to stdout with no
//! container around them. Frames are located purely by their markers:
//!
//! ```text
//!   .. noise .. FF D8 <payload> FF D9 FF D8 <payload> FF D9 ..
//!               └──── frame 0 ──────┘ └──── frame 1 ──────┘
//! ```
//!
//! The end-marker scan only runs once a start marker has been seen and only
//! looks past it, so a stray `FF D8` inside a payload never restarts framing.
//! A stream that drops bytes can desynchronize; marker framing has no way to
//! detect that.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::registry::{Frame, END_MARKER, START_MARKER};

use super::error::CaptureError;

/// Growable byte buffer with a fill cursor
///
/// Capacity only ever grows; consumed bytes are shifted out to the front.
#[derive(Debug)]
pub struct ScratchBuffer {
    data: Vec<u8>,
    filled: usize,
}

impl ScratchBuffer {
    /// Allocate a buffer of `capacity` bytes (at least 1)
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity.max(1)],
            filled: 0,
        }
    }

    /// Allocated size
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Buffered bytes
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.filled]
    }

    /// Whether no spare room is left
    pub fn is_full(&self) -> bool {
        self.filled == self.data.len()
    }

    /// Grow to `new_capacity`, keeping buffered bytes
    fn grow_to(&mut self, new_capacity: usize) {
        if new_capacity > self.data.len() {
            self.data.resize(new_capacity, 0);
        }
    }

    fn spare_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.filled..]
    }

    fn commit(&mut self, n: usize) {
        self.filled += n;
    }

    /// Drop the first `n` buffered bytes
    fn consume(&mut self, n: usize) {
        self.data.copy_within(n..self.filled, 0);
        self.filled -= n;
    }
}

/// Position of `needle` in `haystack`, only considering matches at or after `from`
fn find(haystack: &[u8], needle: &[u8; 2], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// 1.5x growth, rounded up
fn grown(capacity: usize) -> usize {
    capacity + (capacity + 1) / 2
}

/// Pulls JPEG frames out of an async byte source
///
/// Call [`next_frame`](Self::next_frame) repeatedly; it yields `Ok(None)`
/// once the source reaches end of stream. Any partially buffered frame is
/// dropped at that point.
pub struct FrameExtractor<R> {
    reader: R,
    buffer: ScratchBuffer,
    /// A start marker sits at offset 0 of the buffer
    inside: bool,
    /// Where the next end-marker scan resumes
    scan_from: usize,
    /// Frame size cap (0 = unlimited)
    max_frame_size: usize,
    next_sequence: u64,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameExtractor<R> {
    /// Create an extractor with the given initial buffer size and frame cap
    pub fn new(reader: R, initial_buffer_size: usize, max_frame_size: usize) -> Self {
        Self {
            reader,
            buffer: ScratchBuffer::with_capacity(initial_buffer_size),
            inside: false,
            scan_from: 0,
            max_frame_size,
            next_sequence: 0,
            eof: false,
        }
    }

    /// Current scratch buffer capacity
    pub fn buffer_capacity(&self) -> usize {
        self.buffer.capacity()
    }

    /// Number of frames emitted so far
    pub fn frames_emitted(&self) -> u64 {
        self.next_sequence
    }

    /// Read until the next complete frame
    ///
    /// Cancel-safe: if the future is dropped while waiting on the source, no
    /// buffered bytes are lost.
    pub async fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        loop {
            if let Some(frame) = self.take_frame()? {
                return Ok(Some(frame));
            }
            if self.eof {
                return Ok(None);
            }

            if self.buffer.is_full() {
                self.grow();
            }

            let n = self
                .reader
                .read(self.buffer.spare_mut())
                .await
                .map_err(CaptureError::Io)?;

            if n == 0 {
                self.eof = true;
                if !self.buffer.filled().is_empty() {
                    tracing::debug!(
                        discarded = self.buffer.filled().len(),
                        "Capture stream ended mid-frame"
                    );
                }
                return Ok(None);
            }
            self.buffer.commit(n);
        }
    }

    fn grow(&mut self) {
        let current = self.buffer.capacity();
        let mut target = grown(current);
        if self.max_frame_size > current {
            target = target.min(self.max_frame_size);
        }

        tracing::debug!(
            current = current,
            new = target,
            "Scratch buffer full, growing"
        );
        self.buffer.grow_to(target);
    }

    /// Try to cut one frame out of the buffered bytes
    fn take_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if !self.inside {
            match find(self.buffer.filled(), &START_MARKER, 0) {
                Some(start) => {
                    self.buffer.consume(start);
                    self.inside = true;
                    self.scan_from = START_MARKER.len();
                }
                None => {
                    // Keep a trailing FF, the marker may straddle two reads
                    let filled = self.buffer.filled();
                    let keep = usize::from(filled.last() == Some(&START_MARKER[0]));
                    let discard = filled.len() - keep;
                    self.buffer.consume(discard);
                    return Ok(None);
                }
            }
        }

        let filled = self.buffer.filled();
        match find(filled, &END_MARKER, self.scan_from) {
            Some(pos) => {
                let end = pos + END_MARKER.len();
                let data = Bytes::copy_from_slice(&filled[..end]);
                self.buffer.consume(end);
                self.inside = false;
                self.scan_from = 0;

                let frame = Frame::new(self.next_sequence, data);
                self.next_sequence += 1;
                Ok(Some(frame))
            }
            None => {
                let len = filled.len();
                if self.max_frame_size != 0 && len >= self.max_frame_size {
                    return Err(CaptureError::FrameTooLarge {
                        limit: self.max_frame_size,
                    });
                }
                self.scan_from = len.saturating_sub(1).max(START_MARKER.len());
                Ok(None)
            }
        }
    }
}
