//! Latest-frame broadcast
//!
//! The broadcaster keeps exactly one encoded frame: the most recent one
//! handed over by the preview pipeline. Viewers never queue frames; each
//! one asks for "anything newer than generation N" and gets the current
//! frame as soon as it exists.
//!
//! # Architecture
//!
//! ```text
//!     preview pipeline
//!           │ FrameSink::publish()
//!           ▼
//!   ┌──────────────────────────────┐
//!   │ FrameBroadcaster              │
//!   │   watch::Sender<Slot {        │
//!   │     frame: Option<Frame>,     │
//!   │     closed,                   │
//!   │   }>                          │
//!   └──────────────┬───────────────┘
//!                  │ wake all
//!      ┌───────────┼───────────┐
//!      ▼           ▼           ▼
//!  [session]   [session]   [session]
//!  wait_for_next(last_generation)
//! ```
//!
//! `bytes::Bytes` is reference counted, so every viewer shares the same
//! allocation for a given frame.

pub mod broadcaster;
pub mod frame;
pub mod sink;

pub use broadcaster::FrameBroadcaster;
pub use frame::Frame;
pub use sink::FrameSink;
