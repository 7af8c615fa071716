//! Downstream consumers of the camera stream

pub mod mjpeg;

pub use mjpeg::{serve, write_part, MJPEG_CONTENT_TYPE};
