//! Capture error types

use std::io;

/// Error type for the capture process and frame extraction
#[derive(Debug)]
pub enum CaptureError {
    /// The capture program could not be spawned
    Spawn(io::Error),
    /// The process was spawned without a readable output stream
    MissingOutput,
    /// Reading the capture output failed
    Io(io::Error),
    /// A frame grew past the configured cap without an end marker
    FrameTooLarge {
        /// Configured cap in bytes
        limit: usize,
    },
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Spawn(e) => write!(f, "Failed to start capture process: {}", e),
            CaptureError::MissingOutput => write!(f, "Capture process has no output stream"),
            CaptureError::Io(e) => write!(f, "Capture read error: {}", e),
            CaptureError::FrameTooLarge { limit } => {
                write!(f, "Frame exceeds {} bytes without end marker", limit)
            }
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Spawn(e) | CaptureError::Io(e) => Some(e),
            _ => None,
        }
    }
}
