//! HTTP front end
//!
//! An axum router serving the live stream, recording control, still
//! capture, statistics and a landing page.

pub mod config;
pub mod listener;
pub mod routes;

pub use config::ServerConfig;
pub use listener::CamServer;
pub use routes::{CAPTURE_PATH, INDEX_PATH, STREAM_PATH};
