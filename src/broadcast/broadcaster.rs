//! Single-slot frame broadcaster
//!
//! One writer replaces the stored frame; any number of readers wait for a
//! generation newer than the one they last delivered. Built on
//! `tokio::sync::watch`, which gives us the value slot, the version check
//! and the wake-all in one primitive.

use std::sync::atomic::{AtomicBool, Ordering};

use bytes::Bytes;
use tokio::sync::watch;

use super::frame::Frame;

/// Contents of the watch slot
#[derive(Debug, Default)]
struct Slot {
    frame: Option<Frame>,
    closed: bool,
}

impl Slot {
    fn generation(&self) -> u64 {
        self.frame.as_ref().map_or(0, |f| f.generation)
    }
}

/// Holds the most recent frame and wakes every waiting viewer on publish
pub struct FrameBroadcaster {
    tx: watch::Sender<Slot>,

    /// Set while the preview pipeline is intentionally stopped (recording)
    preview_suspended: AtomicBool,
}

impl FrameBroadcaster {
    /// Create an empty broadcaster (generation 0, no frame)
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Slot::default());
        Self {
            tx,
            preview_suspended: AtomicBool::new(false),
        }
    }

    /// Replace the stored frame and wake all waiting readers
    ///
    /// Returns the generation assigned to the frame. Frames published after
    /// `close()` are dropped and the current generation is returned.
    pub fn publish(&self, data: impl Into<Bytes>) -> u64 {
        let data = data.into();
        let mut generation = 0;

        self.tx.send_if_modified(|slot| {
            if slot.closed {
                generation = slot.generation();
                return false;
            }
            generation = slot.generation() + 1;
            slot.frame = Some(Frame::new(generation, data));
            true
        });

        tracing::trace!(generation = generation, "Frame published");
        generation
    }

    /// Wait until a frame newer than `last_seen` exists and return it
    ///
    /// Returns immediately when the stored frame is already newer. Waits
    /// indefinitely otherwise; wrap in `tokio::time::timeout` to bound it.
    /// Returns `None` once the broadcaster has been closed.
    pub async fn wait_for_next(&self, last_seen: u64) -> Option<Frame> {
        let mut rx = self.tx.subscribe();

        // The sender lives in `self`, so `wait_for` can only fail if it is
        // dropped, which cannot happen while we hold `&self`.
        let slot = rx
            .wait_for(|slot| slot.closed || slot.generation() > last_seen)
            .await
            .ok()?;

        if slot.closed {
            return None;
        }
        slot.frame.clone()
    }

    /// The current frame, if any has been published
    pub fn latest(&self) -> Option<Frame> {
        self.tx.borrow().frame.clone()
    }

    /// Generation of the current frame (0 before the first publish)
    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation()
    }

    /// Mark the preview pipeline as intentionally stopped or running
    ///
    /// Viewers use this to tell "recording in progress" apart from a
    /// stalled producer when no frame arrives for a while.
    pub fn set_preview_suspended(&self, suspended: bool) {
        let prev = self.preview_suspended.swap(suspended, Ordering::AcqRel);
        if prev != suspended {
            tracing::debug!(suspended = suspended, "Preview suspension changed");
        }
    }

    /// Whether the preview pipeline is intentionally stopped
    pub fn is_preview_suspended(&self) -> bool {
        self.preview_suspended.load(Ordering::Acquire)
    }

    /// Close the broadcaster, releasing every waiting reader with `None`
    pub fn close(&self) {
        self.tx.send_modify(|slot| slot.closed = true);
        tracing::debug!("Frame broadcaster closed");
    }

    /// Whether `close()` has been called
    pub fn is_closed(&self) -> bool {
        self.tx.borrow().closed
    }

    /// Number of readers currently blocked in `wait_for_next`
    pub fn waiting_readers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for FrameBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}
