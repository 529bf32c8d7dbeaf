//! Capture device control
//!
//! The camera is a single device shared by two mutually exclusive uses:
//! continuous low-rate MJPEG preview feeding the live view, and on-demand
//! high-rate recording to a file. `CaptureModeController` owns the backend
//! and moves the device between those uses one transition at a time.
//!
//! ```text
//!              start_recording()
//!   ┌──────┐ ─────────────────────► ┌───────────┐
//!   │ Idle │                        │ Recording │
//!   └──────┘ ◄───────────────────── └───────────┘
//!   preview → FrameBroadcaster  stop_recording()   encoder → file
//! ```

pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod jpeg;
pub mod naming;
pub mod rpicam;
pub mod state;

#[cfg(test)]
pub(crate) mod mock;

pub use backend::CaptureBackend;
pub use config::{CaptureConfig, VideoFormat};
pub use controller::CaptureModeController;
pub use error::CaptureError;
pub use jpeg::JpegSplitter;
pub use naming::PathAllocator;
pub use rpicam::RpiCamBackend;
pub use state::{RecordingState, RecordingStatus, Transition};
