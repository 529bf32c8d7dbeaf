//! Viewer sessions
//!
//! One `StreamSession` runs per connected viewer, each in its own task.
//! Sessions share nothing except the read-only frame snapshot they take
//! from the broadcaster.

pub mod context;
pub mod framing;
pub mod stream;

pub use context::ConnectionContext;
pub use stream::{SessionEnd, StreamSession};
