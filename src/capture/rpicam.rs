//! Raspberry Pi camera backend
//!
//! Drives the `rpicam-apps` command line tools:
//! - preview: `rpicam-vid --codec mjpeg -o -`, stdout split into JPEG frames
//! - recording: `rpicam-vid --codec h264 -o <path>`
//! - stills: `rpicam-still -o <path>`
//!
//! Only one of these processes owns the camera at a time; the controller
//! guarantees the previous one has exited before the next is launched.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use super::backend::CaptureBackend;
use super::config::CaptureConfig;
use super::error::CaptureError;
use super::jpeg::JpegSplitter;
use crate::broadcast::FrameSink;

const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Running preview process and its stdout reader
pub struct PreviewPipeline {
    child: Child,
    reader: JoinHandle<()>,
}

/// Running recording process
pub struct RecordingPipeline {
    child: Child,
    path: PathBuf,
}

/// Backend built on `rpicam-vid` / `rpicam-still`
#[derive(Debug, Clone)]
pub struct RpiCamBackend {
    config: CaptureConfig,
}

impl RpiCamBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    fn preview_args(&self) -> Vec<String> {
        let fmt = &self.config.preview;
        vec![
            "-t".into(),
            "0".into(),
            "-n".into(),
            "--codec".into(),
            "mjpeg".into(),
            "-q".into(),
            self.config.jpeg_quality.to_string(),
            "--width".into(),
            fmt.width.to_string(),
            "--height".into(),
            fmt.height.to_string(),
            "--framerate".into(),
            fmt.framerate.to_string(),
            "-o".into(),
            "-".into(),
        ]
    }

    fn recording_args(&self, path: &Path) -> Vec<String> {
        let fmt = &self.config.recording;
        vec![
            "-t".into(),
            "0".into(),
            "-n".into(),
            "--codec".into(),
            "h264".into(),
            "-b".into(),
            self.config.recording_bitrate.to_string(),
            "--width".into(),
            fmt.width.to_string(),
            "--height".into(),
            fmt.height.to_string(),
            "--framerate".into(),
            fmt.framerate.to_string(),
            "-o".into(),
            path.display().to_string(),
        ]
    }

    fn still_args(&self, path: &Path) -> Vec<String> {
        let mut args = vec![
            "-n".into(),
            "-t".into(),
            "500".into(),
            "-q".into(),
            self.config.jpeg_quality.to_string(),
        ];
        if let Some((width, height)) = self.config.still_size {
            args.extend([
                "--width".into(),
                width.to_string(),
                "--height".into(),
                height.to_string(),
            ]);
        }
        args.extend(["-o".into(), path.display().to_string()]);
        args
    }

    fn spawn(&self, program: &str, args: &[String], stdout: Stdio) -> Result<Child, CaptureError> {
        tracing::debug!(program = program, args = ?args, "Launching camera command");

        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CaptureError::Spawn {
                program: program.to_string(),
                source,
            })
    }

    /// Ask `child` to stop, escalating to a kill after the stop timeout
    async fn terminate(&self, child: &mut Child) -> Result<ExitStatus, CaptureError> {
        interrupt(child);

        match tokio::time::timeout(self.config.stop_timeout, child.wait()).await {
            Ok(status) => Ok(status?),
            Err(_) => {
                tracing::warn!(
                    timeout_secs = self.config.stop_timeout.as_secs_f64(),
                    "Camera process ignored interrupt, killing"
                );
                child.kill().await?;
                Ok(child.wait().await?)
            }
        }
    }
}

/// Send SIGINT so the encoder can flush its output
#[cfg(unix)]
fn interrupt(child: &mut Child) {
    if let Some(pid) = child.id() {
        // SAFETY: plain kill(2) on a pid we spawned and have not reaped.
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGINT) };
        if rc != 0 {
            tracing::debug!(pid = pid, "SIGINT delivery failed");
        }
    }
}

#[cfg(not(unix))]
fn interrupt(child: &mut Child) {
    let _ = child.start_kill();
}

/// Read MJPEG from stdout and publish every complete frame
async fn pump_frames(
    mut stdout: tokio::process::ChildStdout,
    sink: FrameSink,
    first_frame: oneshot::Sender<()>,
) {
    let mut splitter = JpegSplitter::new();
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    let mut first_frame = Some(first_frame);

    loop {
        let n = match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(error = %e, "Preview read failed");
                break;
            }
        };

        splitter.push(&chunk[..n]);
        while let Some(frame) = splitter.next_frame() {
            sink.publish(frame);
            if let Some(tx) = first_frame.take() {
                let _ = tx.send(());
            }
        }
    }

    tracing::debug!(
        published = sink.published(),
        discarded = splitter.discarded(),
        "Preview output ended"
    );
}

impl CaptureBackend for RpiCamBackend {
    type Preview = PreviewPipeline;
    type Recording = RecordingPipeline;

    async fn start_preview(&mut self, sink: FrameSink) -> Result<PreviewPipeline, CaptureError> {
        let program = self.config.video_command.clone();
        let mut child = self.spawn(&program, &self.preview_args(), Stdio::piped())?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CaptureError::device("preview stdout not captured"))?;

        let (tx, rx) = oneshot::channel();
        let reader = tokio::spawn(pump_frames(stdout, sink, tx));

        // The reader drops `tx` without sending if the process exits first
        match tokio::time::timeout(self.config.startup_timeout, rx).await {
            Ok(Ok(())) => {
                tracing::info!(
                    width = self.config.preview.width,
                    height = self.config.preview.height,
                    fps = self.config.preview.framerate,
                    "Preview pipeline started"
                );
                Ok(PreviewPipeline { child, reader })
            }
            Ok(Err(_)) => {
                let status = child.wait().await?;
                Err(CaptureError::device(format!(
                    "preview exited before producing a frame ({})",
                    status
                )))
            }
            Err(_) => {
                reader.abort();
                let _ = child.kill().await;
                Err(CaptureError::device(format!(
                    "no preview frame within {:?}",
                    self.config.startup_timeout
                )))
            }
        }
    }

    async fn stop_preview(&mut self, mut preview: PreviewPipeline) -> Result<(), CaptureError> {
        let result = self.terminate(&mut preview.child).await;
        preview.reader.abort();

        let status = result?;
        tracing::info!(status = %status, "Preview pipeline stopped");
        Ok(())
    }

    fn is_preview_running(&self, preview: &PreviewPipeline) -> bool {
        !preview.reader.is_finished()
    }

    async fn start_recording(&mut self, path: &Path) -> Result<RecordingPipeline, CaptureError> {
        let program = self.config.video_command.clone();
        let mut child = self.spawn(&program, &self.recording_args(path), Stdio::null())?;

        // Configuration errors make the encoder exit almost immediately
        let grace = self.config.startup_timeout.min(Duration::from_millis(500));
        tokio::time::sleep(grace).await;
        if let Some(status) = child.try_wait()? {
            return Err(CaptureError::device(format!(
                "recorder exited on startup ({})",
                status
            )));
        }

        tracing::info!(path = %path.display(), "Recording pipeline started");
        Ok(RecordingPipeline {
            child,
            path: path.to_path_buf(),
        })
    }

    async fn stop_recording(&mut self, mut recording: RecordingPipeline) -> Result<(), CaptureError> {
        let status = self.terminate(&mut recording.child).await?;
        tracing::info!(
            path = %recording.path.display(),
            status = %status,
            "Recording pipeline stopped"
        );
        Ok(())
    }

    async fn capture_still(&mut self, path: &Path) -> Result<(), CaptureError> {
        let program = self.config.still_command.clone();
        let mut child = self.spawn(&program, &self.still_args(path), Stdio::null())?;

        let status = child.wait().await?;
        if !status.success() {
            return Err(CaptureError::device(format!(
                "{} failed ({})",
                program, status
            )));
        }

        tracing::debug!(path = %path.display(), "Still captured");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::config::VideoFormat;

    #[test]
    fn test_preview_args() {
        let config = CaptureConfig::default()
            .preview(VideoFormat::new(640, 480, 15))
            .jpeg_quality(70);
        let backend = RpiCamBackend::new(config);

        let args = backend.preview_args();
        assert_eq!(
            args,
            [
                "-t", "0", "-n", "--codec", "mjpeg", "-q", "70", "--width", "640", "--height",
                "480", "--framerate", "15", "-o", "-"
            ]
        );
    }

    #[test]
    fn test_recording_args() {
        let backend = RpiCamBackend::new(CaptureConfig::default());
        let args = backend.recording_args(Path::new("/media/video_20240101_000000.h264"));

        assert_eq!(args[4..6], ["h264", "-b"]);
        assert_eq!(args.last().unwrap(), "/media/video_20240101_000000.h264");
    }

    #[test]
    fn test_still_args_with_size() {
        let mut config = CaptureConfig::default();
        config.still_size = Some((4056, 3040));
        let backend = RpiCamBackend::new(config);

        let args = backend.still_args(Path::new("/tmp/still.jpg"));
        assert!(args.windows(2).any(|w| w == ["--width", "4056"]));
        assert!(args.windows(2).any(|w| w == ["--height", "3040"]));
        assert_eq!(args[args.len() - 2..], ["-o", "/tmp/still.jpg"]);
    }

    #[tokio::test]
    async fn test_missing_command_reports_spawn_error() {
        let mut config = CaptureConfig::default();
        config.video_command = "camcast-no-such-command".into();
        let mut backend = RpiCamBackend::new(config);

        let broadcaster = std::sync::Arc::new(crate::broadcast::FrameBroadcaster::new());
        let result = backend.start_preview(FrameSink::new(broadcaster)).await;

        assert!(matches!(result, Err(CaptureError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_preview_that_exits_without_frames_fails() {
        let mut config = CaptureConfig::default().startup_timeout(Duration::from_secs(5));
        config.video_command = "true".into();
        let mut backend = RpiCamBackend::new(config);

        let broadcaster = std::sync::Arc::new(crate::broadcast::FrameBroadcaster::new());
        let result = backend.start_preview(FrameSink::new(broadcaster)).await;

        match result {
            Err(CaptureError::Device(message)) => {
                assert!(message.contains("exited before producing a frame"))
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
