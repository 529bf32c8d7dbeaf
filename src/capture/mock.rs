//! In-memory capture backend for tests
//!
//! Records every call, tracks which pipeline holds the device, and lets
//! tests inject failures or emit preview frames.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use bytes::Bytes;

use super::backend::CaptureBackend;
use super::error::CaptureError;
use crate::broadcast::FrameSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    StartPreview,
    StopPreview,
    StartRecording(PathBuf),
    StopRecording(PathBuf),
    CaptureStill(PathBuf),
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    preview_sink: Option<FrameSink>,
    preview_active: bool,
    recording_active: bool,
    recordings_started: usize,
    device_conflicts: usize,
    fail_start_preview: u32,
    fail_stop_preview: u32,
    fail_start_recording: u32,
    fail_stop_recording: u32,
    still_jpeg: Vec<u8>,
}

impl MockState {
    fn device_busy(&self) -> bool {
        self.preview_active || self.recording_active
    }
}

pub(crate) struct MockPreview;

pub(crate) struct MockRecording {
    path: PathBuf,
}

pub(crate) struct MockBackend {
    state: Arc<Mutex<MockState>>,
    start_delay: Duration,
}

/// Inspection and control side of a `MockBackend`
#[derive(Clone)]
pub(crate) struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    pub(crate) fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState {
            still_jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            ..Default::default()
        }));
        let backend = Self {
            state: Arc::clone(&state),
            start_delay: Duration::ZERO,
        };
        (backend, MockHandle { state })
    }

    /// Make `start_recording` take this long, widening race windows
    pub(crate) fn with_start_delay(mut self, delay: Duration) -> Self {
        self.start_delay = delay;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }
}

impl CaptureBackend for MockBackend {
    type Preview = MockPreview;
    type Recording = MockRecording;

    async fn start_preview(&mut self, sink: FrameSink) -> Result<MockPreview, CaptureError> {
        let mut state = self.lock();
        state.calls.push(Call::StartPreview);

        if state.fail_start_preview > 0 {
            state.fail_start_preview -= 1;
            return Err(CaptureError::device("preview refused"));
        }
        if state.device_busy() {
            state.device_conflicts += 1;
        }

        state.preview_active = true;
        state.preview_sink = Some(sink);
        Ok(MockPreview)
    }

    async fn stop_preview(&mut self, _preview: MockPreview) -> Result<(), CaptureError> {
        let mut state = self.lock();
        state.calls.push(Call::StopPreview);
        state.preview_active = false;
        state.preview_sink = None;

        if state.fail_stop_preview > 0 {
            state.fail_stop_preview -= 1;
            return Err(CaptureError::device("preview did not exit cleanly"));
        }
        Ok(())
    }

    fn is_preview_running(&self, _preview: &MockPreview) -> bool {
        self.lock().preview_active
    }

    async fn start_recording(&mut self, path: &Path) -> Result<MockRecording, CaptureError> {
        {
            let mut state = self.lock();
            state.calls.push(Call::StartRecording(path.to_path_buf()));

            if state.fail_start_recording > 0 {
                state.fail_start_recording -= 1;
                return Err(CaptureError::device("encoder refused"));
            }
            if state.device_busy() {
                state.device_conflicts += 1;
            }
            state.recording_active = true;
            state.recordings_started += 1;
        }

        if !self.start_delay.is_zero() {
            tokio::time::sleep(self.start_delay).await;
        }

        Ok(MockRecording {
            path: path.to_path_buf(),
        })
    }

    async fn stop_recording(&mut self, recording: MockRecording) -> Result<(), CaptureError> {
        let mut state = self.lock();
        state.calls.push(Call::StopRecording(recording.path));
        state.recording_active = false;

        if state.fail_stop_recording > 0 {
            state.fail_stop_recording -= 1;
            return Err(CaptureError::device("encoder did not exit cleanly"));
        }
        Ok(())
    }

    async fn capture_still(&mut self, path: &Path) -> Result<(), CaptureError> {
        let jpeg = {
            let mut state = self.lock();
            state.calls.push(Call::CaptureStill(path.to_path_buf()));
            if state.device_busy() {
                state.device_conflicts += 1;
            }
            state.still_jpeg.clone()
        };

        tokio::fs::write(path, jpeg).await?;
        Ok(())
    }
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    /// Emit a frame through the preview pipeline, if it is running
    pub(crate) fn emit(&self, jpeg: impl Into<Bytes>) -> bool {
        let sink = self.lock().preview_sink.clone();
        match sink {
            Some(sink) => {
                sink.publish(jpeg);
                true
            }
            None => false,
        }
    }

    pub(crate) fn preview_active(&self) -> bool {
        self.lock().preview_active
    }

    pub(crate) fn recording_active(&self) -> bool {
        self.lock().recording_active
    }

    pub(crate) fn recordings_started(&self) -> usize {
        self.lock().recordings_started
    }

    /// Times a pipeline was started while another one held the device
    pub(crate) fn device_conflicts(&self) -> usize {
        self.lock().device_conflicts
    }

    pub(crate) fn fail_next_start_preview(&self, times: u32) {
        self.lock().fail_start_preview = times;
    }

    pub(crate) fn fail_next_stop_preview(&self) {
        self.lock().fail_stop_preview = 1;
    }

    /// Kill the preview pipeline behind the controller's back
    pub(crate) fn crash_preview(&self) {
        let mut state = self.lock();
        state.preview_active = false;
        state.preview_sink = None;
    }

    pub(crate) fn fail_next_start_recording(&self) {
        self.lock().fail_start_recording = 1;
    }

    pub(crate) fn fail_next_stop_recording(&self) {
        self.lock().fail_stop_recording = 1;
    }

    pub(crate) fn set_still(&self, jpeg: &[u8]) {
        self.lock().still_jpeg = jpeg.to_vec();
    }
}
