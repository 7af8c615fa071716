//! Capture lifecycle coordination
//!
//! Decides when the capture process runs. Every decision that depends on the
//! number of subscribers is taken under one async mutex together with the
//! registry change that caused it, so "register then start if stopped" and
//! "unregister then stop if empty" can never interleave:
//!
//! ```text
//!   Stopped ──ensure_started (launch ok)──► Running
//!      ▲                                       │
//!      └──────maybe_stop (no subscribers)──────┘
//! ```
//!
//! A process that exits on its own is not restarted while readers remain;
//! they observe end of stream. The next subscribe reaps the dead run and
//! launches a fresh one.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::capture::{CaptureRun, ProcessSupervisor};
use crate::error::{Error, Result};
use crate::registry::{FrameReceiver, RegistryError, SubscriptionId, SubscriptionRegistry};

/// Capture process state
enum ProcessState {
    Stopped,
    Running(CaptureRun),
}

/// Serializes process start/stop against subscriber registration
pub struct LifecycleCoordinator {
    state: Mutex<ProcessState>,
    /// Mirrors `state` for lock-free status queries
    running: AtomicBool,
    supervisor: ProcessSupervisor,
    registry: Arc<SubscriptionRegistry>,
}

impl LifecycleCoordinator {
    /// Create a coordinator in the stopped state
    pub fn new(supervisor: ProcessSupervisor, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            state: Mutex::new(ProcessState::Stopped),
            running: AtomicBool::new(false),
            supervisor,
            registry,
        }
    }

    /// Whether a capture run is currently owned
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start the capture process unless it is already running
    pub async fn ensure_started(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state).await
    }

    /// Stop the capture process if no subscriber is left
    pub async fn maybe_stop(&self) {
        let mut state = self.state.lock().await;
        self.stop_if_idle(&mut state).await;
    }

    /// Make sure the process runs and register a new subscription
    pub async fn subscribe(&self) -> Result<(SubscriptionId, FrameReceiver)> {
        let mut state = self.state.lock().await;
        self.start_locked(&mut state).await?;

        match self.registry.register() {
            Ok(subscription) => Ok(subscription),
            Err(RegistryError::Closed) => {
                // The run ended between the liveness check and registration
                self.start_locked(&mut state).await?;
                Ok(self.registry.register()?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a subscription and stop the process if it was the last one
    pub async fn release(&self, id: SubscriptionId) -> Result<()> {
        let mut state = self.state.lock().await;
        self.registry.unregister(id)?;
        self.stop_if_idle(&mut state).await;
        Ok(())
    }

    /// Remove a subscription unless it is already gone
    ///
    /// Used for readers dropped without an explicit release, whose id may
    /// already have been handed back through
    /// [`StreamMultiplexer::release`](super::StreamMultiplexer::release).
    pub async fn release_dropped(&self, id: SubscriptionId) {
        let mut state = self.state.lock().await;
        if self.registry.contains(id) {
            // Checked under the lock, so this cannot fail
            let _ = self.registry.unregister(id);
        } else {
            tracing::debug!(subscription = %id, "Dropped reader was already released");
        }
        self.stop_if_idle(&mut state).await;
    }

    /// Stop the process regardless of subscribers
    ///
    /// Attached readers observe end of stream; they still have to be
    /// released.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        self.registry.close();
        self.stop_locked(&mut state).await;
    }

    async fn start_locked(&self, state: &mut ProcessState) -> Result<()> {
        let exited = match &*state {
            ProcessState::Running(run) if !run.is_finished() && self.registry.is_open() => {
                return Ok(());
            }
            ProcessState::Running(_) => true,
            ProcessState::Stopped => false,
        };
        if exited {
            tracing::info!("Capture process exited, reaping before restart");
            self.stop_locked(state).await;
        }

        tracing::info!(subscribers = self.registry.len(), "Starting camera feed");
        match self.supervisor.start() {
            Ok(run) => {
                *state = ProcessState::Running(run);
                self.running.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not start camera process");
                Err(Error::Unavailable(e))
            }
        }
    }

    async fn stop_if_idle(&self, state: &mut ProcessState) {
        if !self.registry.is_empty() {
            return;
        }
        if matches!(state, ProcessState::Running(_)) {
            tracing::info!("Stopping camera feed");
        }
        self.stop_locked(state).await;
    }

    /// Transition to Stopped first, then wait for the run to wind down, so a
    /// dropped caller future cannot leave a stale Running state behind
    async fn stop_locked(&self, state: &mut ProcessState) {
        let previous = std::mem::replace(state, ProcessState::Stopped);
        self.running.store(false, Ordering::Release);

        if let ProcessState::Running(run) = previous {
            self.supervisor.stop(run).await;
        }
    }
}
