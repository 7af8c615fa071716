//! Stream multiplexer facade

use std::sync::Arc;

use crate::capture::{CaptureConfig, CaptureSource, CommandSource, ProcessSupervisor};
use crate::error::Result;
use crate::registry::{SubscriptionId, SubscriptionRegistry};
use crate::stats::{MuxCounters, MuxStats};

use super::lifecycle::LifecycleCoordinator;
use super::reader::{release_detached, CameraReader};

/// Shares one camera capture process between any number of readers
///
/// Cheap to clone; clones share the same process and registry.
#[derive(Clone)]
pub struct StreamMultiplexer {
    coordinator: Arc<LifecycleCoordinator>,
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<MuxCounters>,
    config: Arc<CaptureConfig>,
}

impl StreamMultiplexer {
    /// Create a multiplexer that launches the configured camera program
    pub fn new(config: CaptureConfig) -> Result<Self> {
        let source = CommandSource::new(config.clone());
        Self::with_source(config, Arc::new(source))
    }

    /// Create a multiplexer reading from a custom capture source
    pub fn with_source(config: CaptureConfig, source: Arc<dyn CaptureSource>) -> Result<Self> {
        config.validate()?;

        let registry = Arc::new(SubscriptionRegistry::new());
        let counters = Arc::new(MuxCounters::new());
        let supervisor =
            ProcessSupervisor::new(&config, source, Arc::clone(&registry), Arc::clone(&counters));
        let coordinator = LifecycleCoordinator::new(supervisor, Arc::clone(&registry));

        Ok(Self {
            coordinator: Arc::new(coordinator),
            registry,
            counters,
            config: Arc::new(config),
        })
    }

    /// Attach a new reader, starting the camera if needed
    ///
    /// Fails with [`Error::Unavailable`](crate::Error::Unavailable) if the
    /// capture process cannot be launched. No retry is attempted.
    pub async fn subscribe(&self) -> Result<CameraReader> {
        let (id, frames) = self.coordinator.subscribe().await?;

        tracing::info!(
            subscription = %id,
            subscribers = self.registry.len(),
            "Camera reader attached"
        );

        Ok(CameraReader::new(id, frames, Arc::clone(&self.coordinator)))
    }

    /// Release a subscription by id
    ///
    /// [`CameraReader::release`] is the normal path. Releasing an id twice
    /// yields [`RegistryError::NotRegistered`](crate::RegistryError::NotRegistered).
    /// A reader whose id was released here may still be dropped; it then
    /// finds its subscription gone and does nothing. Calling
    /// [`CameraReader::release`] on it afterwards reports `NotRegistered`.
    pub async fn release(&self, id: SubscriptionId) -> Result<()> {
        release_detached(Arc::clone(&self.coordinator), id).await
    }

    /// Stop the camera even though readers are attached
    pub async fn shutdown(&self) {
        tracing::info!(subscribers = self.registry.len(), "Shutting down camera feed");
        self.coordinator.shutdown().await;
    }

    /// Whether the capture process is running
    pub fn is_running(&self) -> bool {
        self.coordinator.is_running()
    }

    /// Number of attached readers
    pub fn subscriber_count(&self) -> usize {
        self.registry.len()
    }

    /// Current statistics
    pub fn stats(&self) -> MuxStats {
        self.counters
            .snapshot(self.coordinator.is_running(), self.registry.len())
    }

    /// Capture configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::error::Error;
    use crate::mux::testing::{init_tracing, jpeg, FakeCamera};
    use crate::registry::RegistryError;

    const TIMEOUT: Duration = Duration::from_secs(2);

    fn mux(camera: &Arc<FakeCamera>) -> StreamMultiplexer {
        init_tracing();
        StreamMultiplexer::with_source(CaptureConfig::default(), camera.clone()).unwrap()
    }

    /// Wait until the capture side has torn down the given feed
    async fn wait_closed(feed: &mut tokio::io::DuplexStream) {
        tokio::time::timeout(TIMEOUT, async {
            while feed.write_all(&[0x00]).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("capture output was not closed in time");
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        tokio::time::timeout(TIMEOUT, async {
            while !condition() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    #[tokio::test]
    async fn test_end_to_end_three_frames() {
        let camera = Arc::new(FakeCamera::default());
        let config = CaptureConfig::default().resolution(640, 480).flip(false, false);
        assert!(config.args().contains(&"640".to_string()));
        let mux = StreamMultiplexer::with_source(config, camera.clone()).unwrap();

        let mut reader = mux.subscribe().await.unwrap();
        assert!(mux.is_running());

        let mut feed = camera.take_feed();
        let writer = tokio::spawn(async move {
            for seed in 0..3 {
                feed.write_all(&jpeg(seed, 200)).await.unwrap();
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            feed
        });

        for _ in 0..3 {
            let frame = tokio::time::timeout(TIMEOUT, reader.recv())
                .await
                .unwrap()
                .unwrap();
            assert!(!frame.is_empty());
            assert_eq!(&frame.as_ref()[..2], &[0xFF, 0xD8]);
            assert_eq!(&frame.as_ref()[frame.len() - 2..], &[0xFF, 0xD9]);
        }

        let mut feed = writer.await.unwrap();
        reader.release().await.unwrap();

        assert!(!mux.is_running());
        wait_closed(&mut feed).await;

        let stats = mux.stats();
        assert_eq!(stats.process_starts, 1);
        assert_eq!(stats.frames_extracted, 3);
        assert_eq!(stats.subscribers, 0);
    }

    #[tokio::test]
    async fn test_concurrent_subscribe_launches_once() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let (a, b) = tokio::join!(mux.subscribe(), mux.subscribe());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(camera.launches(), 1);
        assert_eq!(mux.subscriber_count(), 2);
        assert_ne!(a.id(), b.id());

        a.release().await.unwrap();
        assert!(mux.is_running());
        b.release().await.unwrap();
        assert!(!mux.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_concurrent_subscribers_share_one_process() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let mux = mux.clone();
                tokio::spawn(async move { mux.subscribe().await })
            })
            .collect();

        let mut readers = Vec::new();
        for task in tasks {
            readers.push(task.await.unwrap().unwrap());
        }
        assert_eq!(camera.launches(), 1);

        let mut feed = camera.take_feed();
        feed.write_all(&jpeg(9, 64)).await.unwrap();
        for reader in readers.iter_mut() {
            let frame = tokio::time::timeout(TIMEOUT, reader.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(frame.as_ref(), &jpeg(9, 64)[..]);
        }

        for reader in readers {
            reader.release().await.unwrap();
        }
        assert!(!mux.is_running());
        wait_closed(&mut feed).await;
    }

    #[tokio::test]
    async fn test_release_and_subscribe_race_ends_coherent() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let first = mux.subscribe().await.unwrap();
        let (released, second) = tokio::join!(first.release(), mux.subscribe());
        released.unwrap();
        let mut second = second.unwrap();

        assert!(mux.is_running());
        assert_eq!(mux.subscriber_count(), 1);
        let launches = camera.launches();
        assert!(launches == 1 || launches == 2, "launches = {}", launches);

        // Whichever process survived, it serves the new reader
        let mut feed = camera.take_feed();
        feed.write_all(&jpeg(3, 32)).await.unwrap();
        let frame = tokio::time::timeout(TIMEOUT, second.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.as_ref(), &jpeg(3, 32)[..]);

        second.release().await.unwrap();
        assert!(!mux.is_running());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subscribe_release_churn_never_runs_two_processes() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let mux = mux.clone();
                tokio::spawn(async move {
                    for _ in 0..20 {
                        let reader = mux.subscribe().await.unwrap();
                        tokio::task::yield_now().await;
                        reader.release().await.unwrap();
                    }
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(mux.subscriber_count(), 0);
        assert!(!mux.is_running());
        assert_eq!(mux.stats().process_starts as usize, camera.launches());
    }

    #[tokio::test]
    async fn test_slow_reader_gets_latest_frame() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);
        let mut reader = mux.subscribe().await.unwrap();

        let mut feed = camera.take_feed();
        feed.write_all(&jpeg(1, 16)).await.unwrap();
        feed.write_all(&jpeg(2, 16)).await.unwrap();
        wait_until(|| mux.stats().frames_extracted == 2).await;

        let frame = reader.recv().await.unwrap();
        assert_eq!(frame.sequence(), 1);
        assert_eq!(frame.as_ref(), &jpeg(2, 16)[..]);

        reader.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_launch_failure_reported_to_subscriber() {
        let camera = Arc::new(FakeCamera::default());
        camera.fail_launches(true);
        let mux = mux(&camera);

        let result = mux.subscribe().await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
        assert!(!mux.is_running());
        assert_eq!(mux.subscriber_count(), 0);
        assert_eq!(mux.stats().launch_failures, 1);
    }

    #[tokio::test]
    async fn test_double_release_is_signalled() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let reader = mux.subscribe().await.unwrap();
        let id = reader.id();
        reader.release().await.unwrap();

        let result = mux.release(id).await;
        assert!(matches!(
            result,
            Err(Error::Registry(RegistryError::NotRegistered(released))) if released == id
        ));
    }

    #[tokio::test]
    async fn test_dropped_reader_is_released() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let reader = mux.subscribe().await.unwrap();
        let mut feed = camera.take_feed();
        drop(reader);

        wait_until(|| mux.subscriber_count() == 0 && !mux.is_running()).await;
        wait_closed(&mut feed).await;
    }

    #[tokio::test]
    async fn test_reader_released_by_id_then_dropped() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let reader = mux.subscribe().await.unwrap();
        mux.release(reader.id()).await.unwrap();
        assert!(!mux.is_running());

        drop(reader);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(mux.subscriber_count(), 0);
        assert!(!mux.is_running());

        let again = mux.subscribe().await.unwrap();
        assert!(mux.is_running());
        again.release().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cancelled_subscribe_and_release_leave_nothing_behind() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let mut tasks = Vec::new();
        for i in 0..32u64 {
            let mux = mux.clone();
            tasks.push(tokio::spawn(async move {
                let budget = Duration::from_micros(25 * (i % 4));
                if let Ok(Ok(reader)) = tokio::time::timeout(budget, mux.subscribe()).await {
                    let _ = tokio::time::timeout(budget, reader.release()).await;
                }
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        wait_until(|| mux.subscriber_count() == 0 && !mux.is_running()).await;
    }

    #[tokio::test]
    async fn test_crash_ends_readers_and_next_subscribe_restarts() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let mut first = mux.subscribe().await.unwrap();
        drop(camera.take_feed());

        let end = tokio::time::timeout(TIMEOUT, first.recv()).await.unwrap();
        assert!(end.is_none());

        // Not restarted on its own
        assert_eq!(camera.launches(), 1);

        let mut second = mux.subscribe().await.unwrap();
        assert_eq!(camera.launches(), 2);

        let mut feed = camera.take_feed();
        feed.write_all(&jpeg(7, 10)).await.unwrap();
        let frame = tokio::time::timeout(TIMEOUT, second.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.sequence(), 0);

        first.release().await.unwrap();
        assert!(mux.is_running());
        second.release().await.unwrap();
        assert!(!mux.is_running());
    }

    #[tokio::test]
    async fn test_recv_until_cancelled_is_local() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let mut a = mux.subscribe().await.unwrap();
        let mut b = mux.subscribe().await.unwrap();

        let cancel = tokio_util::sync::CancellationToken::new();
        cancel.cancel();
        assert!(a.recv_until(&cancel).await.is_none());

        // The other reader and the process are unaffected
        let mut feed = camera.take_feed();
        feed.write_all(&jpeg(4, 8)).await.unwrap();
        assert!(tokio::time::timeout(TIMEOUT, b.recv()).await.unwrap().is_some());
        assert!(tokio::time::timeout(TIMEOUT, a.recv()).await.unwrap().is_some());
        assert!(mux.is_running());

        a.release().await.unwrap();
        b.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let camera = Arc::new(FakeCamera::default());
        let result = StreamMultiplexer::with_source(
            CaptureConfig::default().initial_buffer_size(0),
            camera.clone(),
        );

        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_shutdown_with_attached_reader() {
        let camera = Arc::new(FakeCamera::default());
        let mux = mux(&camera);

        let mut reader = mux.subscribe().await.unwrap();
        let mut feed = camera.take_feed();
        mux.shutdown().await;

        assert!(!mux.is_running());
        assert!(reader.recv().await.is_none());
        wait_closed(&mut feed).await;

        reader.release().await.unwrap();
        assert_eq!(mux.subscriber_count(), 0);
    }
}
