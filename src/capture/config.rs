//! Capture configuration

use std::path::PathBuf;
use std::time::Duration;

/// Resolution and rate for one pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoFormat {
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
}

impl VideoFormat {
    pub const fn new(width: u32, height: u32, framerate: u32) -> Self {
        Self {
            width,
            height,
            framerate,
        }
    }
}

/// Capture configuration options
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Directory recordings and stills are written to
    pub media_dir: PathBuf,

    /// Live preview format (MJPEG)
    pub preview: VideoFormat,

    /// JPEG quality for preview frames and stills (1-100)
    pub jpeg_quality: u8,

    /// Recording format
    pub recording: VideoFormat,

    /// Recording bitrate in bits per second
    pub recording_bitrate: u32,

    /// File extension for recordings
    pub recording_extension: String,

    /// Still capture size (None = sensor default)
    pub still_size: Option<(u32, u32)>,

    /// Delay after stopping a recording before the file counts as complete
    pub settle_delay: Duration,

    /// How long a pipeline may take to show signs of life after launch
    pub startup_timeout: Duration,

    /// How long to wait for an encoder to exit after asking it to stop
    pub stop_timeout: Duration,

    /// Video capture command
    pub video_command: String,

    /// Still capture command
    pub still_command: String,

    /// How often the preview supervisor checks the pipeline while idle
    pub preview_check_interval: Duration,

    /// Ceiling for the supervisor's retry backoff after failed restarts
    pub preview_retry_max: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            media_dir: PathBuf::from("/var/www/html/media"),
            preview: VideoFormat::new(1920, 1080, 30),
            jpeg_quality: 80,
            recording: VideoFormat::new(1920, 1080, 30),
            recording_bitrate: 10_000_000,
            recording_extension: "h264".into(),
            still_size: None,
            settle_delay: Duration::from_secs(1),
            startup_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(3),
            video_command: "rpicam-vid".into(),
            still_command: "rpicam-still".into(),
            preview_check_interval: Duration::from_secs(1),
            preview_retry_max: Duration::from_secs(30),
        }
    }
}

impl CaptureConfig {
    /// Create a config writing to `dir`
    pub fn with_media_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            media_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set the media directory
    pub fn media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media_dir = dir.into();
        self
    }

    /// Set the preview format
    pub fn preview(mut self, format: VideoFormat) -> Self {
        self.preview = format;
        self
    }

    /// Set JPEG quality, clamped to 1..=100
    pub fn jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    /// Set the post-stop settle delay
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the pipeline startup timeout
    pub fn startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    /// Set the preview supervisor's check interval and backoff ceiling
    pub fn preview_retry(mut self, interval: Duration, max: Duration) -> Self {
        self.preview_check_interval = interval;
        self.preview_retry_max = max.max(interval);
        self
    }

    /// Set the recording file extension (without the dot)
    pub fn recording_extension(mut self, ext: impl Into<String>) -> Self {
        self.recording_extension = ext.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CaptureConfig::default();

        assert_eq!(config.media_dir, PathBuf::from("/var/www/html/media"));
        assert_eq!(config.preview, VideoFormat::new(1920, 1080, 30));
        assert_eq!(config.recording_extension, "h264");
        assert_eq!(config.settle_delay, Duration::from_secs(1));
        assert_eq!(config.video_command, "rpicam-vid");
        assert_eq!(config.preview_check_interval, Duration::from_secs(1));
        assert_eq!(config.preview_retry_max, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_chaining() {
        let config = CaptureConfig::with_media_dir("/tmp/media")
            .preview(VideoFormat::new(640, 480, 15))
            .jpeg_quality(250)
            .settle_delay(Duration::ZERO)
            .recording_extension("mp4")
            .preview_retry(Duration::from_millis(200), Duration::from_millis(50));

        assert_eq!(config.media_dir, PathBuf::from("/tmp/media"));
        assert_eq!(config.preview.width, 640);
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.settle_delay, Duration::ZERO);
        assert_eq!(config.recording_extension, "mp4");
        assert_eq!(config.preview_check_interval, Duration::from_millis(200));
        // Ceiling never drops below the interval
        assert_eq!(config.preview_retry_max, Duration::from_millis(200));
    }
}
