//! Single-slot delivery queue
//!
//! Each subscription owns one slot backed by `tokio::sync::watch`. Writing a
//! frame replaces whatever is still unread, so a reader always picks up the
//! most recent frame and never a backlog.

use tokio::sync::watch;

use super::frame::Frame;

/// Create a connected sender/receiver pair with an empty slot
pub(crate) fn slot() -> (FrameSender, FrameReceiver) {
    let (tx, rx) = watch::channel(None);
    (FrameSender { tx }, FrameReceiver { rx })
}

/// Writing half of a slot, held by the registry
#[derive(Debug)]
pub(crate) struct FrameSender {
    tx: watch::Sender<Option<Frame>>,
}

impl FrameSender {
    /// Store a frame, dropping the previous unread one.
    ///
    /// Never blocks. Returns `false` if the receiving half is gone.
    pub(crate) fn offer(&self, frame: Frame) -> bool {
        self.tx.send(Some(frame)).is_ok()
    }
}

/// Reading half of a slot
#[derive(Debug)]
pub struct FrameReceiver {
    rx: watch::Receiver<Option<Frame>>,
}

impl FrameReceiver {
    /// Wait for a frame newer than the last one returned.
    ///
    /// Returns `None` once the slot is closed and its last frame has been
    /// consumed. Cancel-safe: dropping the future loses nothing.
    pub async fn recv(&mut self) -> Option<Frame> {
        loop {
            if self.rx.changed().await.is_err() {
                return None;
            }
            if let Some(frame) = self.rx.borrow_and_update().clone() {
                return Some(frame);
            }
        }
    }
}
