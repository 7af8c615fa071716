//! Test fixtures: an in-memory camera and JPEG builders

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::io::DuplexStream;

use crate::capture::{CaptureError, CaptureProcess, CaptureSource};
use crate::registry::{END_MARKER, START_MARKER};

/// Fake JPEG: markers around a payload free of 0xFF
pub(crate) fn jpeg(seed: u8, len: usize) -> Vec<u8> {
    let mut frame = START_MARKER.to_vec();
    frame.extend((0..len).map(|i| ((i as u8).wrapping_mul(31).wrapping_add(seed)) % 0xFF));
    frame.extend_from_slice(&END_MARKER);
    frame
}

/// Capture source backed by in-memory pipes
///
/// Every launch creates a duplex pipe; the test writes camera output into
/// the feed half. A write failing means the capture side was torn down.
#[derive(Default)]
pub(crate) struct FakeCamera {
    launches: AtomicUsize,
    fail: AtomicBool,
    feeds: Mutex<Vec<DuplexStream>>,
}

impl FakeCamera {
    /// Number of launch calls that succeeded
    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_launches(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Feed of the most recent launch
    pub(crate) fn take_feed(&self) -> DuplexStream {
        self.feeds
            .lock()
            .pop()
            .expect("camera was never launched")
    }
}

impl CaptureSource for FakeCamera {
    fn launch(&self) -> Result<CaptureProcess, CaptureError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(CaptureError::Spawn(io::Error::new(
                io::ErrorKind::NotFound,
                "fake camera unavailable",
            )));
        }

        let (feed, output) = tokio::io::duplex(256 * 1024);
        self.feeds.lock().push(feed);
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(CaptureProcess::from_reader(output))
    }
}

/// Install a log subscriber for test runs (`RUST_LOG=camera_mux=debug`)
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
