//! Capture process supervision
//!
//! Starting a run launches the capture process and spawns one task that
//! drains its output through the [`FrameExtractor`] and fans every frame out
//! to the registry. Stopping cancels that task; the task always kills and
//! reaps the process on its way out.

use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::registry::SubscriptionRegistry;
use crate::stats::MuxCounters;

use super::config::CaptureConfig;
use super::error::CaptureError;
use super::extractor::FrameExtractor;
use super::process::{CaptureOutput, CaptureProcess, CaptureSource};

/// How a capture task ended
#[derive(Debug)]
enum RunEnd {
    /// Stop was requested
    Cancelled,
    /// The process closed its output
    StreamEnded,
    /// Reading or framing failed
    Failed(CaptureError),
}

/// Handle to one running capture process and its task
pub struct CaptureRun {
    task: JoinHandle<()>,
    cancel: CancellationToken,
    started_at: Instant,
}

impl CaptureRun {
    /// Whether the capture task has already exited on its own
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Time since the process was launched
    pub fn uptime(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }
}

/// Launches capture runs and tears them down
pub struct ProcessSupervisor {
    source: Arc<dyn CaptureSource>,
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<MuxCounters>,
    initial_buffer_size: usize,
    max_frame_size: usize,
}

impl ProcessSupervisor {
    /// Create a supervisor feeding `registry` from processes launched by `source`
    pub fn new(
        config: &CaptureConfig,
        source: Arc<dyn CaptureSource>,
        registry: Arc<SubscriptionRegistry>,
        counters: Arc<MuxCounters>,
    ) -> Self {
        Self {
            source,
            registry,
            counters,
            initial_buffer_size: config.initial_buffer_size,
            max_frame_size: config.max_frame_size,
        }
    }

    /// Launch the capture process and spawn its task
    pub fn start(&self) -> Result<CaptureRun, CaptureError> {
        let mut process = match self.source.launch() {
            Ok(process) => process,
            Err(e) => {
                self.counters.record_launch_failure();
                return Err(e);
            }
        };
        let output = match process.take_output() {
            Ok(output) => output,
            Err(e) => {
                self.counters.record_launch_failure();
                return Err(e);
            }
        };

        self.counters.record_start();
        self.registry.reopen();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_capture(
            process,
            FrameExtractor::new(output, self.initial_buffer_size, self.max_frame_size),
            Arc::clone(&self.registry),
            Arc::clone(&self.counters),
            cancel.clone(),
        ));

        Ok(CaptureRun {
            task,
            cancel,
            started_at: Instant::now(),
        })
    }

    /// Cancel a run and wait until its process is gone
    ///
    /// Tolerates a run that already ended on its own.
    pub async fn stop(&self, run: CaptureRun) {
        let uptime = run.uptime();
        run.cancel.cancel();

        match run.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => tracing::error!(error = %e, "Capture task panicked"),
        }

        tracing::debug!(uptime_ms = uptime.as_millis() as u64, "Capture run stopped");
    }
}

async fn run_capture(
    mut process: CaptureProcess,
    mut extractor: FrameExtractor<CaptureOutput>,
    registry: Arc<SubscriptionRegistry>,
    counters: Arc<MuxCounters>,
    cancel: CancellationToken,
) {
    let end = loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break RunEnd::Cancelled,
            next = extractor.next_frame() => next,
        };

        match next {
            Ok(Some(frame)) => {
                let fan_out = registry.fan_out(&frame);
                counters.record_frame(frame.len(), fan_out.delivered, fan_out.refused);

                tracing::trace!(
                    sequence = frame.sequence(),
                    size = frame.len(),
                    delivered = fan_out.delivered,
                    "Frame fanned out"
                );
            }
            Ok(None) => break RunEnd::StreamEnded,
            Err(e) => break RunEnd::Failed(e),
        }
    };

    let frames = extractor.frames_emitted();
    drop(extractor);

    match end {
        RunEnd::Cancelled => {
            tracing::debug!(frames = frames, "Capture cancelled");
        }
        RunEnd::StreamEnded => {
            tracing::info!(frames = frames, "Camera stream ended");
            registry.close();
        }
        RunEnd::Failed(e) => {
            tracing::warn!(frames = frames, error = %e, "Camera stream failed");
            registry.close();
        }
    }

    process.terminate().await;
}
