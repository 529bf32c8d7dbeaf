//! Capture backend trait
//!
//! The backend wraps the actual camera stack. It exposes start/stop pairs
//! whose handles are moved into and out of the controller, so the preview
//! and recording pipelines can never hold the device at the same time.

use std::future::Future;
use std::path::Path;

use super::error::CaptureError;
use crate::broadcast::FrameSink;

/// Camera pipeline primitives driven by `CaptureModeController`
///
/// The controller calls these one at a time under its own lock; backends do
/// not need internal synchronization.
///
/// Stop methods must release the device even when they return an error.
/// The error only reports that the pipeline did not end cleanly.
pub trait CaptureBackend: Send + 'static {
    /// Handle for a running preview pipeline
    type Preview: Send + 'static;

    /// Handle for a running recording pipeline
    type Recording: Send + 'static;

    /// Start continuous MJPEG preview, publishing every frame to `sink`
    fn start_preview(
        &mut self,
        sink: FrameSink,
    ) -> impl Future<Output = Result<Self::Preview, CaptureError>> + Send;

    /// Stop a preview pipeline
    fn stop_preview(
        &mut self,
        preview: Self::Preview,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Whether a preview pipeline is still delivering output
    ///
    /// Polled by the preview supervisor; a pipeline that crashed or hit end
    /// of stream reports `false` and gets restarted.
    fn is_preview_running(&self, preview: &Self::Preview) -> bool;

    /// Start high-rate encoding to `path`
    fn start_recording(
        &mut self,
        path: &Path,
    ) -> impl Future<Output = Result<Self::Recording, CaptureError>> + Send;

    /// Stop a recording pipeline
    fn stop_recording(
        &mut self,
        recording: Self::Recording,
    ) -> impl Future<Output = Result<(), CaptureError>> + Send;

    /// Capture one full-resolution JPEG to `path`
    ///
    /// Only called while neither pipeline is running.
    fn capture_still(&mut self, path: &Path)
        -> impl Future<Output = Result<(), CaptureError>> + Send;
}
