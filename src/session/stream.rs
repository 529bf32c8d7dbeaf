//! Per-viewer streaming loop
//!
//! A `StreamSession` owns one client's body channel and nothing else. It
//! asks the broadcaster for the next frame newer than the one it last
//! delivered, sends it as one multipart part, and repeats until the client
//! goes away.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::framing::encode_part;
use crate::broadcast::{Frame, FrameBroadcaster};
use crate::stats::SessionStats;

/// Why a session stopped streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The response body was dropped (client closed or socket died)
    ClientGone,
    /// The broadcaster was closed (server shutting down)
    Shutdown,
}

/// Streaming loop for one connected viewer
pub struct StreamSession {
    session_id: u64,
    broadcaster: Arc<FrameBroadcaster>,
    body: mpsc::Sender<Bytes>,
    last_generation: u64,
    idle_timeout: Duration,
    stats: SessionStats,
}

impl StreamSession {
    /// Create a session that will deliver the current frame first, if any
    ///
    /// Each part is sent on `body` as one chunk. The receiving side is the
    /// HTTP response body; once it is dropped the session ends.
    pub fn new(
        session_id: u64,
        broadcaster: Arc<FrameBroadcaster>,
        body: mpsc::Sender<Bytes>,
    ) -> Self {
        Self {
            session_id,
            broadcaster,
            body,
            last_generation: 0,
            idle_timeout: Duration::from_secs(5),
            stats: SessionStats::new(),
        }
    }

    /// Set how long to wait for a frame before checking the client is still there
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Only deliver frames newer than `generation`
    pub fn starting_after(mut self, generation: u64) -> Self {
        self.last_generation = generation;
        self
    }

    /// Run until the client disconnects or the broadcaster closes
    pub async fn run(&mut self) -> SessionEnd {
        let started = Instant::now();
        let end = self.stream_loop().await;
        self.stats.duration = started.elapsed();

        tracing::debug!(
            session_id = self.session_id,
            end = ?end,
            frames = self.stats.frames_sent,
            skipped = self.stats.frames_skipped,
            bytes = self.stats.bytes_sent,
            idle_timeouts = self.stats.idle_timeouts,
            "Stream session ended"
        );
        end
    }

    async fn stream_loop(&mut self) -> SessionEnd {
        loop {
            let wait = self.broadcaster.wait_for_next(self.last_generation);
            let frame = match tokio::time::timeout(self.idle_timeout, wait).await {
                Ok(Some(frame)) => frame,
                Ok(None) => return SessionEnd::Shutdown,
                Err(_) => {
                    if !self.on_idle() {
                        return SessionEnd::ClientGone;
                    }
                    continue;
                }
            };

            if !self.deliver(&frame).await {
                tracing::debug!(session_id = self.session_id, "Viewer disconnected");
                return SessionEnd::ClientGone;
            }
        }
    }

    /// Send one frame as a multipart part; false once the body is gone
    async fn deliver(&mut self, frame: &Frame) -> bool {
        let part = encode_part(&frame.data);
        let wire_bytes = part.len();

        if self.body.send(part).await.is_err() {
            return false;
        }

        self.stats
            .on_frame(self.last_generation, frame.generation, wire_bytes);
        self.last_generation = frame.generation;

        tracing::trace!(
            session_id = self.session_id,
            generation = frame.generation,
            size = frame.len(),
            age_ms = frame.age().as_millis() as u64,
            "Frame delivered"
        );
        true
    }

    /// Liveness check after a quiet period; false when the client has left
    fn on_idle(&mut self) -> bool {
        self.stats.idle_timeouts += 1;

        if self.body.is_closed() {
            tracing::debug!(
                session_id = self.session_id,
                idle_timeouts = self.stats.idle_timeouts,
                "Viewer left while no frames were flowing"
            );
            return false;
        }

        if self.broadcaster.is_preview_suspended() {
            tracing::trace!(
                session_id = self.session_id,
                "Preview suspended for recording, holding viewer"
            );
        } else {
            tracing::debug!(
                session_id = self.session_id,
                last_generation = self.last_generation,
                idle_secs = self.idle_timeout.as_secs_f64(),
                "No new frame within idle timeout"
            );
        }
        true
    }

    /// Generation of the last frame handed to the client
    pub fn last_generation(&self) -> u64 {
        self.last_generation
    }

    /// Statistics so far (duration is filled in when `run` returns)
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }
}
