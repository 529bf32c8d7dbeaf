//! HTTP routes
//!
//! Control endpoints answer with a short text/plain status line, still
//! capture with JSON, and `/stream.mjpg` with a long-lived multipart body
//! fed by one `StreamSession` per viewer.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::Engine;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};

use crate::capture::{CaptureBackend, CaptureError, Transition};
use crate::server::listener::Shared;
use crate::session::framing::STREAM_HEADERS;
use crate::session::{ConnectionContext, SessionEnd, StreamSession};

/// Path of the live MJPEG stream
pub const STREAM_PATH: &str = "/stream.mjpg";

/// Path of the landing page
pub const INDEX_PATH: &str = "/index.html";

/// Path of the still capture endpoint
pub const CAPTURE_PATH: &str = "/capture_for_ai";

/// Parts a viewer's body may hold before the session waits on the socket
const STREAM_BUFFER_PARTS: usize = 1;

/// Build the application router
pub(crate) fn router<B: CaptureBackend>(shared: Arc<Shared<B>>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(root))
        .route(INDEX_PATH, get(index_page::<B>))
        .route(STREAM_PATH, get(stream::<B>))
        .route("/recording/status", get(recording_status::<B>))
        .route("/recording/start", post(start_recording::<B>))
        .route("/recording/stop", post(stop_recording::<B>))
        .route(CAPTURE_PATH, post(capture_for_ai::<B>))
        .route("/stats", get(stats_page::<B>))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&shared),
            count_requests::<B>,
        ))
        .layer(cors)
        .with_state(shared)
}

async fn count_requests<B: CaptureBackend>(
    State(shared): State<Arc<Shared<B>>>,
    request: Request,
    next: Next,
) -> Response {
    shared.counters.on_request();
    tracing::debug!(
        method = %request.method(),
        path = %request.uri().path(),
        "Request"
    );
    next.run(request).await
}

async fn root() -> Response {
    (
        StatusCode::MOVED_PERMANENTLY,
        [(header::LOCATION, INDEX_PATH)],
    )
        .into_response()
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found").into_response()
}

async fn index_page<B: CaptureBackend>(State(shared): State<Arc<Shared<B>>>) -> Response {
    let Some(path) = &shared.config.index_page else {
        return not_found().await;
    };

    match tokio::fs::read(path).await {
        Ok(page) => ([(header::CONTENT_TYPE, "text/html")], page).into_response(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => not_found().await,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to read index page");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn recording_status<B: CaptureBackend>(State(shared): State<Arc<Shared<B>>>) -> Response {
    shared.controller.status().to_string().into_response()
}

async fn start_recording<B: CaptureBackend>(State(shared): State<Arc<Shared<B>>>) -> Response {
    command_reply("start recording", shared.controller.start_recording().await)
}

async fn stop_recording<B: CaptureBackend>(State(shared): State<Arc<Shared<B>>>) -> Response {
    command_reply("stop recording", shared.controller.stop_recording().await)
}

fn command_reply(action: &str, result: Result<Transition, CaptureError>) -> Response {
    match result {
        Ok(transition) => {
            if let Some(path) = &transition.finished {
                tracing::info!(path = %path.display(), "Recording saved");
            }
            transition.status.to_string().into_response()
        }
        Err(e) => {
            tracing::warn!(action, error = %e, "Capture command failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// Body of a `/capture_for_ai` reply
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum CaptureReply {
    Success { image: String, timestamp: String },
    Error { message: String },
}

async fn capture_for_ai<B: CaptureBackend>(State(shared): State<Arc<Shared<B>>>) -> Response {
    match shared.controller.capture_still().await {
        Ok(jpeg) => Json(CaptureReply::Success {
            image: base64::engine::general_purpose::STANDARD.encode(&jpeg),
            timestamp: chrono::Local::now()
                .format("%Y-%m-%dT%H:%M:%S%.6f")
                .to_string(),
        })
        .into_response(),
        Err(e) => {
            tracing::warn!(action = "capture still", error = %e, "Capture command failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CaptureReply::Error {
                    message: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn stats_page<B: CaptureBackend>(State(shared): State<Arc<Shared<B>>>) -> Response {
    let stats = shared.stats();
    format!(
        "active_viewers {}\n\
         total_viewers {}\n\
         total_requests {}\n\
         bytes_sent {}\n\
         frames_published {}\n\
         uptime_secs {}\n\
         recording {}\n",
        stats.active_viewers,
        stats.total_viewers,
        stats.total_requests,
        stats.total_bytes_sent,
        stats.frames_published,
        stats.uptime.as_secs(),
        shared.controller.status(),
    )
    .into_response()
}

/// Start a viewer session and stream its parts as the response body
async fn stream<B: CaptureBackend>(
    State(shared): State<Arc<Shared<B>>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
) -> Response {
    let permit = match &shared.viewer_slots {
        Some(slots) => match Arc::clone(slots).try_acquire_owned() {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(peer = %peer, "Viewer rejected: limit reached");
                return (StatusCode::SERVICE_UNAVAILABLE, "Viewer limit reached").into_response();
            }
        },
        None => None,
    };

    let context = ConnectionContext::new(
        shared.next_session_id.fetch_add(1, Ordering::Relaxed),
        peer,
    );
    let (tx, rx) = mpsc::channel(STREAM_BUFFER_PARTS);
    let mut session = StreamSession::new(context.session_id, Arc::clone(&shared.broadcaster), tx)
        .idle_timeout(shared.config.session_idle_timeout);

    shared.counters.on_viewer_joined();
    tracing::info!(
        session_id = context.session_id,
        peer = %context.peer_addr,
        "Viewer connected"
    );

    tokio::spawn(async move {
        // Held for the session's lifetime
        let _permit = permit;

        let end = session.run().await;
        let stats = session.stats().clone();
        shared.counters.on_viewer_left(&stats);

        tracing::info!(
            session_id = context.session_id,
            peer = %context.peer_addr,
            frames = stats.frames_sent,
            bytes = stats.bytes_sent,
            fps = stats.frame_rate(),
            bitrate_bps = stats.bitrate(),
            duration_secs = context.duration().as_secs_f64(),
            shutdown = end == SessionEnd::Shutdown,
            "Viewer left"
        );
    });

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    let mut response = Response::new(body);
    for (name, value) in STREAM_HEADERS {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
    response
}
