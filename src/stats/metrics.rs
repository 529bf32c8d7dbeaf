//! Statistics for viewer sessions and the server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Per-viewer statistics
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    /// Frames written to the client
    pub frames_sent: u64,
    /// Bytes written to the client, framing included
    pub bytes_sent: u64,
    /// Frames published while this viewer was still writing an older one
    pub frames_skipped: u64,
    /// Idle timeouts hit while waiting for a frame
    pub idle_timeouts: u64,
    /// Session duration
    pub duration: Duration,
}

impl SessionStats {
    /// Create new stats tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one delivered frame
    ///
    /// `previous` is the generation delivered before this one (0 if none).
    pub fn on_frame(&mut self, previous: u64, generation: u64, wire_bytes: usize) {
        self.frames_sent += 1;
        self.bytes_sent += wire_bytes as u64;
        if previous > 0 && generation > previous + 1 {
            self.frames_skipped += generation - previous - 1;
        }
    }

    /// Average delivered frame rate over the session
    pub fn frame_rate(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.frames_sent as f64 / secs
        } else {
            0.0
        }
    }

    /// Average output bitrate in bits per second
    pub fn bitrate(&self) -> u64 {
        let secs = self.duration.as_secs();
        if secs > 0 {
            (self.bytes_sent * 8) / secs
        } else {
            0
        }
    }
}

/// Live viewer counters shared by the listener and its connection tasks
#[derive(Debug)]
pub struct ViewerCounters {
    started_at: Instant,
    total_requests: AtomicU64,
    active_viewers: AtomicU64,
    total_viewers: AtomicU64,
    bytes_sent: AtomicU64,
}

impl ViewerCounters {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_requests: AtomicU64::new(0),
            active_viewers: AtomicU64::new(0),
            total_viewers: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
        }
    }

    pub fn on_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_viewer_joined(&self) {
        self.active_viewers.fetch_add(1, Ordering::Relaxed);
        self.total_viewers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn on_viewer_left(&self, stats: &SessionStats) {
        self.active_viewers.fetch_sub(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(stats.bytes_sent, Ordering::Relaxed);
    }

    /// Take a point-in-time snapshot
    pub fn snapshot(&self, frames_published: u64) -> ServerStats {
        ServerStats {
            total_requests: self.total_requests.load(Ordering::Relaxed),
            active_viewers: self.active_viewers.load(Ordering::Relaxed),
            total_viewers: self.total_viewers.load(Ordering::Relaxed),
            total_bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            frames_published,
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ViewerCounters {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics snapshot
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// HTTP requests handled
    pub total_requests: u64,
    /// Viewers currently streaming
    pub active_viewers: u64,
    /// Viewers ever connected
    pub total_viewers: u64,
    /// Bytes sent by finished viewer sessions
    pub total_bytes_sent: u64,
    /// Current frame generation
    pub frames_published: u64,
    /// Uptime
    pub uptime: Duration,
}
