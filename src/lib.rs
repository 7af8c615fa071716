//! Shared camera stream multiplexer
//!
//! Runs a single external capture process (`rpicam-vid` by default), cuts its
//! raw MJPEG output into JPEG frames and fans every frame out to any number of
//! independently paced readers. The process is started when the first reader
//! subscribes and stopped when the last one is released.
//!
//! ```text
//!   rpicam-vid ──stdout──► FrameExtractor ──► SubscriptionRegistry::fan_out
//!                                                   │
//!                         ┌─────────────────────────┼───────────────────┐
//!                         ▼                         ▼                   ▼
//!                   [CameraReader]            [CameraReader]      [CameraReader]
//!                   watch slot (1)            watch slot (1)      watch slot (1)
//! ```
//!
//! Each reader owns a single-slot queue: an unread frame is replaced by the
//! next one, so slow readers always see the freshest image and never block the
//! capture loop or each other.
//!
//! # Example
//! ```no_run
//! use camera_mux::{CaptureConfig, StreamMultiplexer};
//!
//! # async fn example() -> camera_mux::Result<()> {
//! let mux = StreamMultiplexer::new(CaptureConfig::default().resolution(640, 480))?;
//!
//! let mut reader = mux.subscribe().await?;
//! while let Some(frame) = reader.recv().await {
//!     println!("frame #{}: {} bytes", frame.sequence(), frame.len());
//! }
//! reader.release().await?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod error;
pub mod mux;
pub mod registry;
pub mod stats;
pub mod stream;

pub use capture::{CaptureConfig, CaptureError, CaptureProcess, CaptureSource, CommandSource};
pub use error::{Error, Result};
pub use mux::{CameraReader, StreamMultiplexer};
pub use registry::{Frame, RegistryError, SubscriptionId};
pub use stats::MuxStats;
