//! Stream multiplexer
//!
//! The public entry point. [`StreamMultiplexer::subscribe`] hands out
//! [`CameraReader`]s; the [`LifecycleCoordinator`] starts the capture process
//! for the first reader and stops it after the last one is released.

pub mod lifecycle;
pub mod multiplexer;
pub mod reader;

#[cfg(test)]
pub(crate) mod testing;

pub use lifecycle::LifecycleCoordinator;
pub use multiplexer::StreamMultiplexer;
pub use reader::CameraReader;
