//! Publish handle handed to the preview pipeline

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use super::broadcaster::FrameBroadcaster;

/// Cloneable handle the capture pipeline uses to emit encoded frames
///
/// The pipeline only ever sees this type, never the broadcaster's read side.
#[derive(Clone)]
pub struct FrameSink {
    broadcaster: Arc<FrameBroadcaster>,
    published: Arc<AtomicU64>,
}

impl FrameSink {
    /// Create a sink feeding the given broadcaster
    pub fn new(broadcaster: Arc<FrameBroadcaster>) -> Self {
        Self {
            broadcaster,
            published: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Hand a newly encoded JPEG to every viewer
    pub fn publish(&self, jpeg: impl Into<Bytes>) -> u64 {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.broadcaster.publish(jpeg)
    }

    /// Frames pushed through this sink and its clones
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FrameSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameSink")
            .field("published", &self.published())
            .field("generation", &self.broadcaster.generation())
            .finish()
    }
}
