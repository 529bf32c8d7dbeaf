//! Capture error types

use std::io;

/// Error type for capture device operations
#[derive(Debug)]
pub enum CaptureError {
    /// A camera command could not be launched
    Spawn {
        /// Program that failed to start
        program: String,
        /// Underlying error
        source: io::Error,
    },
    /// The device rejected a configuration or a pipeline died
    Device(String),
    /// File I/O in the media directory failed
    Io(io::Error),
    /// The device is recording and cannot serve this request
    Busy,
    /// The controller has been shut down
    Closed,
}

impl CaptureError {
    /// Shorthand for a device error
    pub fn device(msg: impl Into<String>) -> Self {
        CaptureError::Device(msg.into())
    }
}

impl std::fmt::Display for CaptureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CaptureError::Spawn { program, source } => {
                write!(f, "Failed to start {}: {}", program, source)
            }
            CaptureError::Device(msg) => write!(f, "Device error: {}", msg),
            CaptureError::Io(e) => write!(f, "Media I/O error: {}", e),
            CaptureError::Busy => write!(f, "Camera is busy recording"),
            CaptureError::Closed => write!(f, "Capture controller is shut down"),
        }
    }
}

impl std::error::Error for CaptureError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CaptureError::Spawn { source, .. } => Some(source),
            CaptureError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for CaptureError {
    fn from(e: io::Error) -> Self {
        CaptureError::Io(e)
    }
}
