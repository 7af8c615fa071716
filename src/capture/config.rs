//! Capture configuration

use crate::error::{Error, Result};

/// Default capture program
pub const DEFAULT_PROGRAM: &str = "rpicam-vid";

/// Default initial scratch buffer size in bytes
pub const DEFAULT_INITIAL_BUFFER_SIZE: usize = 12_000;

/// Default upper bound for a single frame (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Capture process configuration
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Program to launch
    pub program: String,

    /// Frame width (0 = camera default)
    pub width: u32,

    /// Frame height (0 = camera default)
    pub height: u32,

    /// Mirror horizontally
    pub hflip: bool,

    /// Mirror vertically
    pub vflip: bool,

    /// Extra arguments appended verbatim to the command line
    pub extra_args: Vec<String>,

    /// Forward the capture program's stderr to the log instead of discarding it
    pub emit_camera_logs: bool,

    /// Initial scratch buffer size for frame extraction
    pub initial_buffer_size: usize,

    /// Largest accepted frame in bytes (0 = unlimited)
    pub max_frame_size: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            width: 0,
            height: 0,
            hflip: false,
            vflip: false,
            extra_args: Vec::new(),
            emit_camera_logs: false,
            initial_buffer_size: DEFAULT_INITIAL_BUFFER_SIZE,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl CaptureConfig {
    /// Set the program to launch
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the capture resolution
    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    /// Set horizontal and vertical flip
    pub fn flip(mut self, hflip: bool, vflip: bool) -> Self {
        self.hflip = hflip;
        self.vflip = vflip;
        self
    }

    /// Append a pass-through argument
    pub fn extra_arg(mut self, arg: impl Into<String>) -> Self {
        self.extra_args.push(arg.into());
        self
    }

    /// Surface capture diagnostics in the log
    pub fn emit_camera_logs(mut self, emit: bool) -> Self {
        self.emit_camera_logs = emit;
        self
    }

    /// Set the initial scratch buffer size
    pub fn initial_buffer_size(mut self, size: usize) -> Self {
        self.initial_buffer_size = size;
        self
    }

    /// Set the frame size cap (0 disables it)
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Check the configuration for values the extractor cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.program.is_empty() {
            return Err(Error::Config("program must not be empty".into()));
        }
        if self.initial_buffer_size == 0 {
            return Err(Error::Config("initial_buffer_size must be at least 1".into()));
        }
        if self.max_frame_size != 0 && self.max_frame_size < self.initial_buffer_size {
            return Err(Error::Config(format!(
                "max_frame_size ({}) is smaller than initial_buffer_size ({})",
                self.max_frame_size, self.initial_buffer_size
            )));
        }
        Ok(())
    }

    /// Build the capture command line (without the program name)
    pub fn args(&self) -> Vec<String> {
        let mut args: Vec<String> = ["--output", "-", "--codec", "mjpeg", "--nopreview", "--timeout", "0"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        if self.height != 0 {
            args.push("--height".into());
            args.push(self.height.to_string());
        }
        if self.width != 0 {
            args.push("--width".into());
            args.push(self.width.to_string());
        }

        if self.hflip {
            args.push("--hflip".into());
        }
        if self.vflip {
            args.push("--vflip".into());
        }

        args.extend(self.extra_args.iter().cloned());
        args
    }
}
