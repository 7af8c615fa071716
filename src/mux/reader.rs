//! Subscriber handle

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::registry::{Frame, FrameReceiver, SubscriptionId};

use super::lifecycle::LifecycleCoordinator;

/// One reader's view of the shared camera stream
///
/// Obtained from [`StreamMultiplexer::subscribe`](super::StreamMultiplexer::subscribe).
/// Call [`release`](Self::release) when done; a reader dropped without
/// releasing schedules its release on the current tokio runtime.
pub struct CameraReader {
    id: SubscriptionId,
    frames: FrameReceiver,
    coordinator: Option<Arc<LifecycleCoordinator>>,
}

impl CameraReader {
    pub(crate) fn new(
        id: SubscriptionId,
        frames: FrameReceiver,
        coordinator: Arc<LifecycleCoordinator>,
    ) -> Self {
        Self {
            id,
            frames,
            coordinator: Some(coordinator),
        }
    }

    /// Subscription token of this reader
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next frame
    ///
    /// Returns the newest frame produced since the previous call; frames
    /// produced in between are skipped. `None` means the capture stream
    /// ended. Cancel-safe.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    /// Like [`recv`](Self::recv), but gives up with `None` once `cancel` fires
    pub async fn recv_until(&mut self, cancel: &CancellationToken) -> Option<Frame> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            frame = self.frames.recv() => frame,
        }
    }

    /// Hand the subscription back
    ///
    /// Stops the capture process if this was the last reader. The release
    /// runs on its own task, so it completes even if this future is dropped.
    pub async fn release(mut self) -> Result<()> {
        match self.coordinator.take() {
            Some(coordinator) => release_detached(coordinator, self.id).await,
            None => Ok(()),
        }
    }
}

/// Run a release on its own task and wait for it
///
/// Dropping the returned future detaches the task instead of abandoning the
/// release halfway.
pub(crate) async fn release_detached(
    coordinator: Arc<LifecycleCoordinator>,
    id: SubscriptionId,
) -> Result<()> {
    let task = tokio::spawn(async move { coordinator.release(id).await });

    match task.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(_) => {
            tracing::warn!(subscription = %id, "Release cancelled by runtime shutdown");
            Ok(())
        }
    }
}

impl Drop for CameraReader {
    fn drop(&mut self) {
        let Some(coordinator) = self.coordinator.take() else {
            return;
        };
        let id = self.id;

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                tracing::debug!(subscription = %id, "Camera reader dropped without release");
                handle.spawn(async move {
                    coordinator.release_dropped(id).await;
                });
            }
            Err(_) => {
                tracing::error!(
                    subscription = %id,
                    "Camera reader dropped outside a runtime, subscription leaked"
                );
            }
        }
    }
}

impl std::fmt::Debug for CameraReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraReader")
            .field("id", &self.id)
            .field("released", &self.coordinator.is_none())
            .finish()
    }
}
