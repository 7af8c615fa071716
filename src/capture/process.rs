//! External capture process
//!
//! [`CaptureSource`] is the seam between the supervisor and whatever produces
//! the raw MJPEG byte stream. [`CommandSource`] launches the real camera
//! program; tests and tools can hand in any async reader instead.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

use super::config::CaptureConfig;
use super::error::CaptureError;

/// Raw capture output
pub type CaptureOutput = Box<dyn AsyncRead + Send + Unpin>;

/// Something that can launch a capture process
pub trait CaptureSource: Send + Sync + 'static {
    /// Start producing raw MJPEG output.
    ///
    /// Called at most once per capture run; failures are reported to the
    /// subscriber that triggered the start and are not retried.
    fn launch(&self) -> Result<CaptureProcess, CaptureError>;
}

/// A running capture process and its output stream
///
/// Killing is guaranteed: [`terminate`](Self::terminate) kills and reaps the
/// process, and dropping an unterminated handle kills it as well.
pub struct CaptureProcess {
    output: Option<CaptureOutput>,
    child: Option<Child>,
}

impl CaptureProcess {
    /// Wrap a spawned child whose stdout carries the capture stream
    pub fn from_child(child: Child, output: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            output: Some(Box::new(output)),
            child: Some(child),
        }
    }

    /// Wrap a plain byte source with no process behind it
    pub fn from_reader(output: impl AsyncRead + Send + Unpin + 'static) -> Self {
        Self {
            output: Some(Box::new(output)),
            child: None,
        }
    }

    /// OS process id, if there is a live child
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(|c| c.id())
    }

    /// Take the output stream; can only be done once
    pub fn take_output(&mut self) -> Result<CaptureOutput, CaptureError> {
        self.output.take().ok_or(CaptureError::MissingOutput)
    }

    /// Kill the process (and its process group) unless it already exited,
    /// then reap it
    pub async fn terminate(&mut self) {
        self.output.take();

        let Some(mut child) = self.child.take() else {
            return;
        };

        match child.try_wait() {
            Ok(Some(status)) => {
                tracing::debug!(status = %status, "Capture process already exited");
            }
            Ok(None) | Err(_) => {
                signal_group(&child);
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "Failed to kill capture process");
                } else {
                    tracing::debug!("Capture process killed");
                }
            }
        }
    }
}

impl Drop for CaptureProcess {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                signal_group(child);
                let _ = child.start_kill();
            }
        }
    }
}

/// Kill every process in the child's group (the child leads its own group)
#[cfg(unix)]
fn signal_group(child: &Child) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    let Ok(pid) = i32::try_from(pid) else {
        return;
    };
    if let Err(e) = killpg(Pid::from_raw(pid), Signal::SIGKILL) {
        tracing::debug!(pid = pid, error = %e, "Failed to signal capture process group");
    }
}

#[cfg(not(unix))]
fn signal_group(_child: &Child) {}

/// Launches the configured camera program (`rpicam-vid` by default)
#[derive(Debug, Clone)]
pub struct CommandSource {
    config: CaptureConfig,
}

impl CommandSource {
    /// Create a source for the given configuration
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    /// Build the command without spawning it
    fn command(&self) -> Command {
        let mut command = Command::new(&self.config.program);
        command
            .args(self.config.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(if self.config.emit_camera_logs {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        #[cfg(unix)]
        command.process_group(0);

        command
    }
}

impl CaptureSource for CommandSource {
    fn launch(&self) -> Result<CaptureProcess, CaptureError> {
        tracing::info!(
            program = %self.config.program,
            args = %self.config.args().join(" "),
            "Starting capture process"
        );

        let mut child = self.command().spawn().map_err(CaptureError::Spawn)?;
        let stdout = child.stdout.take().ok_or(CaptureError::MissingOutput)?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_logs(stderr));
        }

        tracing::info!(pid = ?child.id(), "Capture process started");
        Ok(CaptureProcess::from_child(child, stdout))
    }
}

/// Surface the capture program's diagnostics through the log
async fn forward_logs<R: AsyncRead + Unpin>(reader: R) {
    let mut lines = BufReader::new(reader).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => tracing::info!(target: "camera_mux::camera", "{}", line),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(error = %e, "Error reading capture diagnostics");
                break;
            }
        }
    }
}
