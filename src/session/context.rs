//! Viewer context
//!
//! Identity of one streaming viewer, carried into its session's log
//! fields.

use std::net::SocketAddr;
use std::time::Instant;

/// Context for one connected viewer
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    /// Unique session ID
    pub session_id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// Time the viewer's stream was opened
    pub connected_at: Instant,
}

impl ConnectionContext {
    /// Create a new context
    pub fn new(session_id: u64, peer_addr: SocketAddr) -> Self {
        Self {
            session_id,
            peer_addr,
            connected_at: Instant::now(),
        }
    }

    /// Time since the stream was opened
    pub fn duration(&self) -> std::time::Duration {
        self.connected_at.elapsed()
    }
}
