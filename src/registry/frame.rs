//! Frame and subscription identity types
//!
//! This module defines the token identifying a subscription and the frames
//! delivered to subscribers.

use bytes::Bytes;

/// JPEG start-of-image marker
pub const START_MARKER: [u8; 2] = [0xFF, 0xD8];

/// JPEG end-of-image marker
pub const END_MARKER: [u8; 2] = [0xFF, 0xD9];

/// Opaque token identifying one subscription in a registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value, useful for logging
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// One complete JPEG image cut out of the capture stream
///
/// Includes both the start and the end marker. Cheap to clone: the bytes are
/// immutable and reference counted, every subscriber gets a read-only view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Position of this frame in the output of its capture process
    sequence: u64,
    /// Image data, `FF D8 .. FF D9`
    data: Bytes,
}

impl Frame {
    /// Create a frame
    pub fn new(sequence: u64, data: Bytes) -> Self {
        Self { sequence, data }
    }

    /// Sequence number within the producing capture process (starts at 0)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Frame bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the frame holds no bytes
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}
