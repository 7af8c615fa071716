//! Statistics for the camera multiplexer

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared between the coordinator and the capture task
#[derive(Debug, Default)]
pub struct MuxCounters {
    process_starts: AtomicU64,
    launch_failures: AtomicU64,
    frames_extracted: AtomicU64,
    bytes_extracted: AtomicU64,
    frames_delivered: AtomicU64,
    delivery_failures: AtomicU64,
}

impl MuxCounters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_start(&self) {
        self.process_starts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_launch_failure(&self) {
        self.launch_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one extracted frame and its fan-out result
    pub(crate) fn record_frame(&self, size: usize, delivered: usize, refused: usize) {
        self.frames_extracted.fetch_add(1, Ordering::Relaxed);
        self.bytes_extracted
            .fetch_add(size as u64, Ordering::Relaxed);
        self.frames_delivered
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.delivery_failures
            .fetch_add(refused as u64, Ordering::Relaxed);
    }

    /// Take a snapshot combined with the live lifecycle state
    pub fn snapshot(&self, running: bool, subscribers: usize) -> MuxStats {
        MuxStats {
            running,
            subscribers,
            process_starts: self.process_starts.load(Ordering::Relaxed),
            launch_failures: self.launch_failures.load(Ordering::Relaxed),
            frames_extracted: self.frames_extracted.load(Ordering::Relaxed),
            bytes_extracted: self.bytes_extracted.load(Ordering::Relaxed),
            frames_delivered: self.frames_delivered.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time multiplexer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MuxStats {
    /// Whether a capture process is currently owned by the coordinator
    pub running: bool,
    /// Number of registered readers
    pub subscribers: usize,
    /// Capture processes launched
    pub process_starts: u64,
    /// Launch attempts that failed
    pub launch_failures: u64,
    /// Frames cut out of capture output
    pub frames_extracted: u64,
    /// Total size of extracted frames
    pub bytes_extracted: u64,
    /// Individual frame deliveries into reader slots
    pub frames_delivered: u64,
    /// Deliveries refused because the reader was gone
    pub delivery_failures: u64,
}

impl MuxStats {
    /// Average extracted frame size in bytes
    pub fn average_frame_size(&self) -> u64 {
        if self.frames_extracted > 0 {
            self.bytes_extracted / self.frames_extracted
        } else {
            0
        }
    }
}
