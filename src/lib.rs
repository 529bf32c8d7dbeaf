//! camcast: live MJPEG camera server with on-demand recording
//!
//! One camera feeds many HTTP viewers. The preview pipeline publishes JPEG
//! frames into a [`FrameBroadcaster`]; every viewer runs its own
//! [`StreamSession`] that always sends the newest frame and never blocks
//! the producer or other viewers. Recording and still capture take the
//! camera away from the preview through the [`CaptureModeController`],
//! which returns it once they finish.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use camcast::{CamServer, CaptureConfig, CaptureModeController, FrameBroadcaster};
//! use camcast::{RpiCamBackend, ServerConfig};
//!
//! # async fn run() -> camcast::Result<()> {
//! let capture = CaptureConfig::default();
//! let broadcaster = Arc::new(FrameBroadcaster::new());
//! let backend = RpiCamBackend::new(capture.clone());
//! let controller = CaptureModeController::new(backend, Arc::clone(&broadcaster), capture);
//!
//! let server = CamServer::new(ServerConfig::default(), broadcaster, controller);
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
//! # }
//! ```

pub mod broadcast;
pub mod capture;
pub mod error;
pub mod logging;
pub mod server;
pub mod session;
pub mod stats;

pub use broadcast::{Frame, FrameBroadcaster, FrameSink};
pub use capture::{
    CaptureBackend, CaptureConfig, CaptureError, CaptureModeController, RecordingState,
    RecordingStatus, RpiCamBackend,
};
pub use error::{Error, Result};
pub use server::{CamServer, ServerConfig};
pub use session::{SessionEnd, StreamSession};
pub use stats::{ServerStats, SessionStats};
