//! Camera capture
//!
//! This module provides:
//! - Capture configuration and command-line construction
//! - JPEG frame extraction from the raw MJPEG byte stream
//! - Launching and killing the external capture process
//! - The per-process capture task that feeds the subscription registry

pub mod config;
pub mod error;
pub mod extractor;
pub mod process;
pub mod supervisor;

pub use config::CaptureConfig;
pub use error::CaptureError;
pub use extractor::{FrameExtractor, ScratchBuffer};
pub use process::{CaptureOutput, CaptureProcess, CaptureSource, CommandSource};
pub use supervisor::{CaptureRun, ProcessSupervisor};
