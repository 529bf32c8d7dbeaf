//! Encoded frame type

use std::time::Instant;

use bytes::Bytes;

/// One encoded still image plus the generation it was published under
///
/// Cheap to clone: the payload is a reference-counted `Bytes`.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Publish counter value for this frame (first frame is 1)
    pub generation: u64,
    /// JPEG bytes
    pub data: Bytes,
    /// When the broadcaster accepted the frame
    pub published_at: Instant,
}

impl Frame {
    pub(crate) fn new(generation: u64, data: Bytes) -> Self {
        Self {
            generation,
            data,
            published_at: Instant::now(),
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Time elapsed since the frame was published
    pub fn age(&self) -> std::time::Duration {
        self.published_at.elapsed()
    }
}
