//! Recording state types

use std::path::{Path, PathBuf};

/// Mode of the capture device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// Preview running, feeding the live view
    Idle,
    /// High-rate encoder writing to a file, preview suspended
    Recording,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingState::Idle => "idle",
            RecordingState::Recording => "recording",
        }
    }
}

impl std::fmt::Display for RecordingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible recording status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordingStatus {
    Idle,
    Recording {
        /// Output file of the active recording
        path: PathBuf,
    },
}

impl RecordingStatus {
    /// The bare state
    pub fn state(&self) -> RecordingState {
        match self {
            RecordingStatus::Idle => RecordingState::Idle,
            RecordingStatus::Recording { .. } => RecordingState::Recording,
        }
    }

    /// Output path while recording
    pub fn path(&self) -> Option<&Path> {
        match self {
            RecordingStatus::Idle => None,
            RecordingStatus::Recording { path } => Some(path),
        }
    }

    pub fn is_recording(&self) -> bool {
        matches!(self, RecordingStatus::Recording { .. })
    }
}

impl std::fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordingStatus::Idle => write!(f, "idle"),
            RecordingStatus::Recording { path } => write!(f, "recording {}", path.display()),
        }
    }
}

/// Result of a recording command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Status after the command
    pub status: RecordingStatus,
    /// Whether the command changed the state (false = same-state no-op)
    pub changed: bool,
    /// File finished by this command (stop only)
    pub finished: Option<PathBuf>,
}

impl Transition {
    pub(crate) fn changed(status: RecordingStatus) -> Self {
        Self {
            status,
            changed: true,
            finished: None,
        }
    }

    pub(crate) fn unchanged(status: RecordingStatus) -> Self {
        Self {
            status,
            changed: false,
            finished: None,
        }
    }

    pub(crate) fn finished(path: PathBuf) -> Self {
        Self {
            status: RecordingStatus::Idle,
            changed: true,
            finished: Some(path),
        }
    }
}
