//! Error types
//!
//! Crate-level error returned by the multiplexer facade, wrapping the
//! capture and registry errors.

use std::io;

use crate::capture::CaptureError;
use crate::registry::RegistryError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for multiplexer operations
#[derive(Debug)]
pub enum Error {
    /// The capture process could not be started
    Unavailable(CaptureError),
    /// Registry invariant violated (e.g. a reader released twice)
    Registry(RegistryError),
    /// Invalid configuration
    Config(String),
    /// I/O error while writing frames downstream
    Io(io::Error),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Unavailable(e) => write!(f, "Camera unavailable: {}", e),
            Error::Registry(e) => write!(f, "Registry error: {}", e),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
            Error::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Unavailable(e) => Some(e),
            Error::Registry(e) => Some(e),
            Error::Io(e) => Some(e),
            Error::Config(_) => None,
        }
    }
}

impl From<CaptureError> for Error {
    fn from(e: CaptureError) -> Self {
        Error::Unavailable(e)
    }
}

impl From<RegistryError> for Error {
    fn from(e: RegistryError) -> Self {
        Error::Registry(e)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}
