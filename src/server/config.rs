//! Server configuration

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 8000;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Maximum concurrent `/stream.mjpg` viewers (0 = unlimited)
    pub max_viewers: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// How long a viewer waits for a frame before a liveness check
    pub session_idle_timeout: Duration,

    /// Page served at `/index.html` (None = 404)
    pub index_page: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            max_viewers: 0,    // Unlimited
            tcp_nodelay: true, // Frames should leave as soon as they are written
            session_idle_timeout: Duration::from_secs(5),
            index_page: Some(PathBuf::from("/var/www/html/index.html")),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the viewer limit
    pub fn max_viewers(mut self, max: usize) -> Self {
        self.max_viewers = max;
        self
    }

    /// Set the viewer idle timeout
    pub fn session_idle_timeout(mut self, timeout: Duration) -> Self {
        self.session_idle_timeout = timeout;
        self
    }

    /// Set the index page
    pub fn index_page(mut self, path: Option<PathBuf>) -> Self {
        self.index_page = path;
        self
    }
}
