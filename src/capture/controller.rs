//! Recording state machine
//!
//! `CaptureModeController` owns the capture backend and the handle of
//! whichever pipeline currently holds the camera. Every command runs to
//! completion under one async mutex, so concurrent HTTP requests see the
//! transitions strictly one after another.
//!
//! Recording suspends the preview: while the encoder writes to a file no
//! frames reach the broadcaster, and the broadcaster is told so explicitly.
//! A supervisor task brings the preview back whenever it should be running
//! but is not.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::backend::CaptureBackend;
use super::config::CaptureConfig;
use super::error::CaptureError;
use super::naming::PathAllocator;
use super::state::{RecordingState, RecordingStatus, Transition};
use crate::broadcast::{FrameBroadcaster, FrameSink};

const RECORDING_PREFIX: &str = "video";
const STILL_PREFIX: &str = "ai_capture";
const STILL_EXTENSION: &str = "jpg";

/// Active recording bookkeeping
struct ActiveRecording<H> {
    handle: H,
    path: std::path::PathBuf,
    started_at: Instant,
}

/// Which pipeline holds the device
enum Mode<B: CaptureBackend> {
    /// Preview should be running; `None` if it failed to (re)start
    Idle { preview: Option<B::Preview> },
    Recording(ActiveRecording<B::Recording>),
}

struct Inner<B: CaptureBackend> {
    backend: B,
    mode: Mode<B>,
    paths: PathAllocator,
    closed: bool,
}

/// Serializes preview / recording / still transitions on one camera
pub struct CaptureModeController<B: CaptureBackend> {
    inner: Mutex<Inner<B>>,
    broadcaster: Arc<FrameBroadcaster>,
    config: CaptureConfig,
    status_tx: watch::Sender<RecordingStatus>,
}

impl<B: CaptureBackend> CaptureModeController<B> {
    /// Create a controller in `Idle` with no pipeline running yet
    ///
    /// Call `start_preview()` to begin feeding the broadcaster.
    pub fn new(backend: B, broadcaster: Arc<FrameBroadcaster>, config: CaptureConfig) -> Self {
        let (status_tx, _) = watch::channel(RecordingStatus::Idle);
        let paths = PathAllocator::new(config.media_dir.clone());

        Self {
            inner: Mutex::new(Inner {
                backend,
                mode: Mode::Idle { preview: None },
                paths,
                closed: false,
            }),
            broadcaster,
            config,
            status_tx,
        }
    }

    /// Current status, without waiting for an in-flight transition
    pub fn status(&self) -> RecordingStatus {
        self.status_tx.borrow().clone()
    }

    /// Current state, without waiting for an in-flight transition
    pub fn state(&self) -> RecordingState {
        self.status_tx.borrow().state()
    }

    /// Watch status changes
    pub fn subscribe(&self) -> watch::Receiver<RecordingStatus> {
        self.status_tx.subscribe()
    }

    /// The capture configuration
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Start the preview pipeline if it is not running
    ///
    /// No-op while recording or when preview is already up.
    pub async fn start_preview(&self) -> Result<(), CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(CaptureError::Closed);
        }

        if matches!(inner.mode, Mode::Idle { preview: None }) {
            self.resume_preview(&mut inner).await?;
        }
        Ok(())
    }

    /// Restart the preview if it should be running but is not
    ///
    /// Covers a preview that failed to come back after a transition and one
    /// whose pipeline died on its own. Returns whether a restart happened.
    /// No-op while recording.
    pub async fn ensure_preview(&self) -> Result<bool, CaptureError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        if inner.closed {
            return Err(CaptureError::Closed);
        }

        let healthy = match &inner.mode {
            Mode::Recording(_) => return Ok(false),
            Mode::Idle { preview } => preview
                .as_ref()
                .is_some_and(|p| inner.backend.is_preview_running(p)),
        };
        if healthy {
            return Ok(false);
        }

        let dead = match &mut inner.mode {
            Mode::Idle { preview } => preview.take(),
            Mode::Recording(_) => None,
        };
        match dead {
            Some(dead) => {
                tracing::warn!("Preview pipeline exited, restarting");
                if let Err(e) = inner.backend.stop_preview(dead).await {
                    tracing::debug!(error = %e, "Dead preview did not stop cleanly");
                }
            }
            None => tracing::info!("Retrying preview start"),
        }

        self.resume_preview(inner).await?;
        Ok(true)
    }

    /// Keep the preview alive in the background until shutdown
    ///
    /// Checks every `preview_check_interval`. Failed restarts back off by
    /// doubling up to `preview_retry_max`.
    pub fn spawn_preview_supervisor(self: &Arc<Self>) -> JoinHandle<()> {
        let controller = Arc::clone(self);
        tokio::spawn(async move { controller.supervise_preview().await })
    }

    async fn supervise_preview(&self) {
        let interval = self.config.preview_check_interval;
        let mut delay = interval;

        loop {
            tokio::time::sleep(delay).await;

            match self.ensure_preview().await {
                Ok(restarted) => {
                    if restarted {
                        tracing::info!("Preview pipeline restored");
                    }
                    delay = interval;
                }
                Err(CaptureError::Closed) => break,
                Err(e) => {
                    delay = (delay * 2).min(self.config.preview_retry_max);
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = delay.as_secs_f64(),
                        "Preview restart failed"
                    );
                }
            }
        }

        tracing::debug!("Preview supervisor stopped");
    }

    /// Switch from preview to recording
    ///
    /// While already recording this is a no-op returning the current status.
    /// On failure the preview is restored before the error is returned.
    pub async fn start_recording(&self) -> Result<Transition, CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(CaptureError::Closed);
        }

        let preview = match &mut inner.mode {
            Mode::Recording(active) => {
                tracing::debug!(path = %active.path.display(), "Already recording");
                return Ok(Transition::unchanged(RecordingStatus::Recording {
                    path: active.path.clone(),
                }));
            }
            Mode::Idle { preview } => preview.take(),
        };

        let path = inner
            .paths
            .allocate(RECORDING_PREFIX, &self.config.recording_extension);

        self.broadcaster.set_preview_suspended(true);
        if let Err(e) = self.release_preview(&mut inner, preview).await {
            self.recover(&mut inner, "stop preview for recording", &e)
                .await;
            return Err(e);
        }

        match inner.backend.start_recording(&path).await {
            Ok(handle) => {
                inner.mode = Mode::Recording(ActiveRecording {
                    handle,
                    path: path.clone(),
                    started_at: Instant::now(),
                });
                let status = RecordingStatus::Recording { path };
                self.set_status(status.clone());

                tracing::info!(status = %status, "Recording started");
                Ok(Transition::changed(status))
            }
            Err(e) => {
                self.recover(&mut inner, "start recording", &e).await;
                Err(e)
            }
        }
    }

    /// Switch from recording back to preview
    ///
    /// While idle this is a no-op. The state is `Idle` when this returns,
    /// whether or not the encoder or the preview restart reported an error.
    pub async fn stop_recording(&self) -> Result<Transition, CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(CaptureError::Closed);
        }

        let active = match std::mem::replace(&mut inner.mode, Mode::Idle { preview: None }) {
            Mode::Recording(active) => active,
            idle @ Mode::Idle { .. } => {
                inner.mode = idle;
                tracing::debug!("Not recording, nothing to stop");
                return Ok(Transition::unchanged(RecordingStatus::Idle));
            }
        };

        let path = active.path;
        let duration = active.started_at.elapsed();
        let stopped = inner.backend.stop_recording(active.handle).await;

        // Give the encoder's buffered writes time to land on disk
        tokio::time::sleep(self.config.settle_delay).await;

        let resumed = self.resume_preview(&mut inner).await;
        self.set_status(RecordingStatus::Idle);

        match (&stopped, &resumed) {
            (Ok(()), Ok(())) => tracing::info!(
                path = %path.display(),
                duration_secs = duration.as_secs_f64(),
                "Recording stopped"
            ),
            _ => tracing::warn!(
                path = %path.display(),
                stop_ok = stopped.is_ok(),
                preview_ok = resumed.is_ok(),
                "Recording stopped with errors"
            ),
        }

        stopped?;
        resumed?;
        Ok(Transition::finished(path))
    }

    /// Capture one full-resolution JPEG
    ///
    /// Suspends the preview for the duration of the capture. The temporary
    /// file is removed once read. Fails with `Busy` while recording.
    pub async fn capture_still(&self) -> Result<Bytes, CaptureError> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(CaptureError::Closed);
        }

        let preview = match &mut inner.mode {
            Mode::Recording(_) => return Err(CaptureError::Busy),
            Mode::Idle { preview } => preview.take(),
        };

        let path = inner.paths.allocate(STILL_PREFIX, STILL_EXTENSION);

        self.broadcaster.set_preview_suspended(true);
        if let Err(e) = self.release_preview(&mut inner, preview).await {
            self.recover(&mut inner, "stop preview for still", &e).await;
            return Err(e);
        }

        let captured = match inner.backend.capture_still(&path).await {
            Ok(()) => tokio::fs::read(&path).await.map_err(CaptureError::from),
            Err(e) => Err(e),
        };

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to remove still capture"
            ),
        }

        let resumed = self.resume_preview(&mut inner).await;

        let jpeg = captured?;
        resumed?;
        tracing::info!(size = jpeg.len(), "Still captured");
        Ok(Bytes::from(jpeg))
    }

    /// Stop whatever pipeline is running and refuse further commands
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return;
        }
        inner.closed = true;

        match std::mem::replace(&mut inner.mode, Mode::Idle { preview: None }) {
            Mode::Recording(active) => {
                if let Err(e) = inner.backend.stop_recording(active.handle).await {
                    tracing::warn!(error = %e, "Failed to stop recording on shutdown");
                }
                tracing::info!(path = %active.path.display(), "Recording closed on shutdown");
            }
            Mode::Idle { preview: Some(preview) } => {
                if let Err(e) = inner.backend.stop_preview(preview).await {
                    tracing::warn!(error = %e, "Failed to stop preview on shutdown");
                }
            }
            Mode::Idle { preview: None } => {}
        }

        self.set_status(RecordingStatus::Idle);
        tracing::info!("Capture controller shut down");
    }

    async fn release_preview(
        &self,
        inner: &mut Inner<B>,
        preview: Option<B::Preview>,
    ) -> Result<(), CaptureError> {
        match preview {
            Some(preview) => inner.backend.stop_preview(preview).await,
            None => Ok(()),
        }
    }

    /// Restart preview and mark the device idle
    async fn resume_preview(&self, inner: &mut Inner<B>) -> Result<(), CaptureError> {
        let sink = FrameSink::new(Arc::clone(&self.broadcaster));
        let result = inner.backend.start_preview(sink).await;
        self.broadcaster.set_preview_suspended(false);

        match result {
            Ok(preview) => {
                inner.mode = Mode::Idle {
                    preview: Some(preview),
                };
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Preview pipeline could not be started");
                inner.mode = Mode::Idle { preview: None };
                Err(e)
            }
        }
    }

    /// Fall back to idle + preview after a failed transition
    async fn recover(&self, inner: &mut Inner<B>, during: &str, cause: &CaptureError) {
        tracing::error!(during = during, error = %cause, "Capture transition failed, restoring preview");

        if self.resume_preview(inner).await.is_ok() {
            tracing::info!("Preview restored after failed transition");
        }
        self.set_status(RecordingStatus::Idle);
    }

    fn set_status(&self, status: RecordingStatus) {
        self.status_tx.send_replace(status);
    }
}
