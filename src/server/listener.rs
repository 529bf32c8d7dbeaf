//! Camera server listener
//!
//! Binds the TCP listener, serves the router with graceful shutdown and
//! keeps the preview supervised while it runs.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use axum::serve::ListenerExt;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::broadcast::FrameBroadcaster;
use crate::capture::{CaptureBackend, CaptureModeController};
use crate::error::Result;
use crate::server::config::ServerConfig;
use crate::server::routes;
use crate::stats::{ServerStats, ViewerCounters};

/// State shared by the listener and every request handler
pub(crate) struct Shared<B: CaptureBackend> {
    pub(crate) config: ServerConfig,
    pub(crate) broadcaster: Arc<FrameBroadcaster>,
    pub(crate) controller: Arc<CaptureModeController<B>>,
    pub(crate) counters: ViewerCounters,
    pub(crate) next_session_id: AtomicU64,
    pub(crate) viewer_slots: Option<Arc<Semaphore>>,
}

impl<B: CaptureBackend> Shared<B> {
    pub(crate) fn stats(&self) -> ServerStats {
        self.counters.snapshot(self.broadcaster.generation())
    }
}

/// HTTP camera server
pub struct CamServer<B: CaptureBackend> {
    shared: Arc<Shared<B>>,
}

impl<B: CaptureBackend> CamServer<B> {
    /// Create a new server
    ///
    /// `controller` must publish into `broadcaster`.
    pub fn new(
        config: ServerConfig,
        broadcaster: Arc<FrameBroadcaster>,
        controller: CaptureModeController<B>,
    ) -> Self {
        let viewer_slots = if config.max_viewers > 0 {
            Some(Arc::new(Semaphore::new(config.max_viewers)))
        } else {
            None
        };

        Self {
            shared: Arc::new(Shared {
                config,
                broadcaster,
                controller: Arc::new(controller),
                counters: ViewerCounters::new(),
                next_session_id: AtomicU64::new(1),
                viewer_slots,
            }),
        }
    }

    /// The capture controller
    pub fn controller(&self) -> &Arc<CaptureModeController<B>> {
        &self.shared.controller
    }

    /// The frame broadcaster
    pub fn broadcaster(&self) -> &Arc<FrameBroadcaster> {
        &self.shared.broadcaster
    }

    /// Server-wide statistics snapshot
    pub fn stats(&self) -> ServerStats {
        self.shared.stats()
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(self.shared.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    ///
    /// Starts the preview pipeline and its supervisor first. On shutdown
    /// the capture device is released and every viewer stream is ended, so
    /// in-flight responses can finish.
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(addr = %addr, "Camera server listening");

        // Viewers can connect and wait even if the camera is not up yet
        if let Err(e) = self.shared.controller.start_preview().await {
            tracing::error!(error = %e, "Failed to start preview, supervisor will retry");
        }
        let supervisor = self.shared.controller.spawn_preview_supervisor();

        let tcp_nodelay = self.shared.config.tcp_nodelay;
        let listener = listener.tap_io(move |tcp| {
            if tcp_nodelay {
                if let Err(e) = tcp.set_nodelay(true) {
                    tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
                }
            }
        });

        let app = routes::router(Arc::clone(&self.shared));
        let shared = Arc::clone(&self.shared);
        let signal = async move {
            shutdown.await;
            tracing::info!("Shutdown signal received");
            shared.controller.shutdown().await;
            shared.broadcaster.close();
        };

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await;

        supervisor.abort();
        self.shutdown().await;
        Ok(result?)
    }

    /// Release the camera and end all viewer sessions
    pub async fn shutdown(&self) {
        self.shared.controller.shutdown().await;
        self.shared.broadcaster.close();

        let stats = self.stats();
        tracing::info!(
            total_viewers = stats.total_viewers,
            total_requests = stats.total_requests,
            bytes_sent = stats.total_bytes_sent,
            frames_published = stats.frames_published,
            "Camera server stopped"
        );
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.shared.config.bind_addr
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::Duration;

    use base64::Engine;
    use bytes::Bytes;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;
    use tokio::task::JoinHandle;

    use super::*;
    use crate::capture::mock::{Call, MockBackend, MockHandle};
    use crate::capture::CaptureConfig;
    use crate::session::framing::encode_part;

    struct TestServer {
        addr: SocketAddr,
        server: Arc<CamServer<MockBackend>>,
        handle: MockHandle,
        stop: Option<oneshot::Sender<()>>,
        task: JoinHandle<Result<()>>,
    }

    /// Status code and lowercased headers of a reply
    struct Head {
        status: u16,
        headers: Vec<(String, String)>,
    }

    impl Head {
        fn parse(raw: &[u8]) -> Self {
            let text = String::from_utf8(raw.to_vec()).unwrap();
            let mut lines = text.split("\r\n");
            let status = lines
                .next()
                .and_then(|line| line.split(' ').nth(1))
                .unwrap()
                .parse()
                .unwrap();
            let headers = lines
                .filter(|line| !line.is_empty())
                .map(|line| {
                    let (name, value) = line.split_once(':').unwrap();
                    (name.trim().to_ascii_lowercase(), value.trim().to_string())
                })
                .collect();
            Self { status, headers }
        }

        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.as_str())
        }
    }

    impl TestServer {
        async fn start(dir: &Path, config: ServerConfig) -> Self {
            let (backend, handle) = MockBackend::new();
            let broadcaster = Arc::new(FrameBroadcaster::new());
            let capture = CaptureConfig::with_media_dir(dir).settle_delay(Duration::ZERO);
            let controller = CaptureModeController::new(backend, Arc::clone(&broadcaster), capture);
            let server = Arc::new(CamServer::new(config, broadcaster, controller));

            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let (stop, stopped) = oneshot::channel::<()>();

            let task = {
                let server = Arc::clone(&server);
                tokio::spawn(async move {
                    server
                        .serve_until(listener, async move {
                            let _ = stopped.await;
                        })
                        .await
                })
            };

            for _ in 0..100 {
                if handle.preview_active() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert!(handle.preview_active());

            Self {
                addr,
                server,
                handle,
                stop: Some(stop),
                task,
            }
        }

        /// Send raw request bytes and read the whole reply
        async fn request(&self, raw: &str) -> (Head, Vec<u8>) {
            let mut socket = TcpStream::connect(self.addr).await.unwrap();
            socket.write_all(raw.as_bytes()).await.unwrap();

            let mut buf = Vec::new();
            socket.read_to_end(&mut buf).await.unwrap();

            let split = buf
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map(|p| p + 4)
                .unwrap();
            (Head::parse(&buf[..split]), buf[split..].to_vec())
        }

        /// HTTP/1.0 request, so the reply body is close-delimited
        async fn call(&self, method: &str, path: &str) -> (Head, Vec<u8>) {
            self.request(&format!("{} {} HTTP/1.0\r\nHost: cam\r\n\r\n", method, path))
                .await
        }

        async fn stop(mut self) {
            if let Some(stop) = self.stop.take() {
                let _ = stop.send(());
            }
            self.task.await.unwrap().unwrap();
        }
    }

    /// Read a response head byte by byte, leaving the body unread
    async fn read_head(socket: &mut TcpStream) -> Head {
        let mut buf = Vec::new();
        while !buf.ends_with(b"\r\n\r\n") {
            buf.push(socket.read_u8().await.unwrap());
        }
        Head::parse(&buf)
    }

    async fn open_stream(addr: SocketAddr) -> (TcpStream, Head) {
        let mut viewer = TcpStream::connect(addr).await.unwrap();
        viewer
            .write_all(b"GET /stream.mjpg HTTP/1.0\r\n\r\n")
            .await
            .unwrap();
        let head = read_head(&mut viewer).await;
        (viewer, head)
    }

    fn config() -> ServerConfig {
        ServerConfig::default()
            .index_page(None)
            .session_idle_timeout(Duration::from_millis(50))
    }

    #[tokio::test]
    async fn test_root_redirects_to_index() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;

        let (head, _) = server.call("GET", "/").await;
        assert_eq!(head.status, 301);
        assert_eq!(head.header("location"), Some("/index.html"));

        server.stop().await;
    }

    #[tokio::test]
    async fn test_index_page_served_or_missing() {
        let dir = tempfile::tempdir().unwrap();
        let page = dir.path().join("index.html");
        std::fs::write(&page, "<html>cam</html>").unwrap();

        let server = TestServer::start(dir.path(), config().index_page(Some(page))).await;
        let (head, body) = server.call("GET", "/index.html").await;
        assert_eq!(head.status, 200);
        assert_eq!(head.header("content-type"), Some("text/html"));
        assert_eq!(body, b"<html>cam</html>");
        server.stop().await;

        let missing = dir.path().join("nope.html");
        let server = TestServer::start(dir.path(), config().index_page(Some(missing))).await;
        let (head, _) = server.call("GET", "/index.html").await;
        assert_eq!(head.status, 404);
        server.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_path_and_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;

        let (head, _) = server.call("GET", "/nothing").await;
        assert_eq!(head.status, 404);

        let (head, _) = server.call("POST", "/stream.mjpg").await;
        assert_eq!(head.status, 405);

        let (head, _) = server.request("NONSENSE\r\n\r\n").await;
        assert_eq!(head.status, 400);

        let mut oversized = String::from("GET /stats HTTP/1.0\r\n");
        for i in 0..200 {
            oversized.push_str(&format!("X-Filler-{}: {}\r\n", i, i));
        }
        oversized.push_str("\r\n");
        let (head, _) = server.request(&oversized).await;
        assert_eq!(head.status, 431);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_options_returns_cors() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;

        let (head, body) = server
            .request(
                "OPTIONS /recording/start HTTP/1.0\r\n\
                 Origin: http://viewer.local\r\n\
                 Access-Control-Request-Method: POST\r\n\r\n",
            )
            .await;
        assert_eq!(head.status, 200);
        assert_eq!(head.header("access-control-allow-origin"), Some("*"));
        let methods = head.header("access-control-allow-methods").unwrap();
        for method in ["GET", "POST", "OPTIONS"] {
            assert!(methods.contains(method), "missing {} in {}", method, methods);
        }
        assert!(head
            .header("access-control-allow-headers")
            .unwrap()
            .eq_ignore_ascii_case("content-type"));
        assert!(body.is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_recording_lifecycle_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;

        let (_, body) = server.call("GET", "/recording/status").await;
        assert_eq!(body, b"idle");

        let (head, body) = server.call("POST", "/recording/start").await;
        assert_eq!(head.status, 200);
        assert_eq!(head.header("access-control-allow-origin"), Some("*"));
        let body = String::from_utf8(body).unwrap();
        assert!(body.starts_with("recording "));
        assert!(body.contains(dir.path().to_str().unwrap()));
        assert!(server.handle.recording_active());
        assert!(!server.handle.preview_active());

        // Starting again is a no-op
        let (_, again) = server.call("POST", "/recording/start").await;
        assert_eq!(String::from_utf8(again).unwrap(), body);
        assert_eq!(server.handle.recordings_started(), 1);

        let (_, body) = server.call("POST", "/recording/stop").await;
        assert_eq!(body, b"idle");
        assert!(!server.handle.recording_active());
        assert!(server.handle.preview_active());
        assert_eq!(server.handle.device_conflicts(), 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_capture_returns_base64_json() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;
        let jpeg = [0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9];
        server.handle.set_still(&jpeg);

        let (head, body) = server.call("POST", "/capture_for_ai").await;
        assert_eq!(head.status, 200);
        assert_eq!(head.header("content-type"), Some("application/json"));
        assert_eq!(head.header("access-control-allow-origin"), Some("*"));

        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["status"], "success");
        let image = base64::engine::general_purpose::STANDARD
            .decode(reply["image"].as_str().unwrap())
            .unwrap();
        assert_eq!(image, jpeg);
        let timestamp = reply["timestamp"].as_str().unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S%.f").is_ok());

        let still = server
            .handle
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::CaptureStill(path) => Some(path),
                _ => None,
            })
            .unwrap();
        assert!(still
            .file_name()
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("ai_capture_"));
        assert!(!still.exists());
        assert!(server.handle.preview_active());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_capture_while_recording_reports_json_error() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;

        server.call("POST", "/recording/start").await;
        let (head, body) = server.call("POST", "/capture_for_ai").await;
        assert_eq!(head.status, 500);

        let reply: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(reply["status"], "error");
        assert_eq!(reply["message"], "Camera is busy recording");
        assert!(reply.get("image").is_none());
        assert!(server.handle.recording_active());

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stream_delivers_frames_until_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;

        let (mut viewer, head) = open_stream(server.addr).await;
        assert_eq!(head.status, 200);
        assert_eq!(head.header("age"), Some("0"));
        assert_eq!(head.header("cache-control"), Some("no-cache, private"));
        assert_eq!(head.header("pragma"), Some("no-cache"));
        assert_eq!(
            head.header("content-type"),
            Some("multipart/x-mixed-replace; boundary=FRAME")
        );

        let frame = Bytes::from_static(&[0xFF, 0xD8, 0xAA, 0xBB, 0xFF, 0xD9]);
        assert!(server.handle.emit(frame.clone()));

        let expected_part = encode_part(&frame);
        let mut part = vec![0u8; expected_part.len()];
        viewer.read_exact(&mut part).await.unwrap();
        assert_eq!(part, expected_part.to_vec());

        assert_eq!(server.server.stats().active_viewers, 1);

        let server_handle = Arc::clone(&server.server);
        server.stop().await;

        // Shutdown closes the stream
        let mut rest = Vec::new();
        tokio::time::timeout(Duration::from_secs(2), viewer.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap();
        assert!(rest.is_empty());

        for _ in 0..100 {
            if server_handle.stats().active_viewers == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let stats = server_handle.stats();
        assert_eq!(stats.active_viewers, 0);
        assert_eq!(stats.total_viewers, 1);
        assert_eq!(stats.total_requests, 1);
        assert_eq!(stats.total_bytes_sent, expected_part.len() as u64);
    }

    #[tokio::test]
    async fn test_departed_viewer_is_released() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;

        let (viewer, _) = open_stream(server.addr).await;
        assert_eq!(server.server.stats().active_viewers, 1);
        drop(viewer);

        for _ in 0..200 {
            if server.server.stats().active_viewers == 0 {
                break;
            }
            server.handle.emit(Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stats = server.server.stats();
        assert_eq!(stats.active_viewers, 0);
        assert_eq!(stats.total_viewers, 1);

        // Other viewers and the camera are unaffected
        assert!(server.handle.preview_active());
        let (_second, head) = open_stream(server.addr).await;
        assert_eq!(head.status, 200);

        server.stop().await;
    }

    #[tokio::test]
    async fn test_shutdown_releases_camera() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;
        server.call("POST", "/recording/start").await;

        let handle = server.handle.clone();
        let inner = Arc::clone(&server.server);
        server.stop().await;

        assert!(!handle.recording_active());
        assert!(!handle.preview_active());
        assert!(inner.broadcaster().is_closed());
    }

    #[tokio::test]
    async fn test_viewer_limit() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config().max_viewers(1)).await;

        let (_first, head) = open_stream(server.addr).await;
        assert_eq!(head.status, 200);

        let (head, _) = server.call("GET", "/stream.mjpg").await;
        assert_eq!(head.status, 503);

        // Control routes are not limited
        let (head, body) = server.call("GET", "/recording/status").await;
        assert_eq!(head.status, 200);
        assert_eq!(body, b"idle");

        server.stop().await;
    }

    #[tokio::test]
    async fn test_stats_page() {
        let dir = tempfile::tempdir().unwrap();
        let server = TestServer::start(dir.path(), config()).await;
        server.handle.emit(Bytes::from_static(b"jpeg"));

        let (head, body) = server.call("GET", "/stats").await;
        assert_eq!(head.status, 200);
        let body = String::from_utf8(body).unwrap();
        assert!(body.contains("frames_published 1\n"));
        assert!(body.contains("total_requests 1\n"));
        assert!(body.contains("recording idle\n"));

        server.stop().await;
    }
}
