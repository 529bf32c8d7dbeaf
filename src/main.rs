//! camcast server binary
//!
//! Run with: camcast [BIND_ADDR] [--media-dir DIR] [--index FILE] [--log-dir DIR]
//!
//! Examples:
//!   camcast                              # binds to 0.0.0.0:8000
//!   camcast localhost                    # binds to 127.0.0.1:8000
//!   camcast 0.0.0.0:8080 --media-dir /srv/media
//!
//! View the stream at http://<host>:8000/stream.mjpg

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use camcast::logging::init_logging;
use camcast::server::config::DEFAULT_PORT;
use camcast::server::STREAM_PATH;
use camcast::{CamServer, CaptureConfig, CaptureModeController, FrameBroadcaster};
use camcast::{RpiCamBackend, ServerConfig};

/// Parsed command line
#[derive(Debug, Default, PartialEq)]
struct Args {
    bind_addr: Option<SocketAddr>,
    media_dir: Option<PathBuf>,
    index_page: Option<PathBuf>,
    log_dir: Option<PathBuf>,
    help: bool,
}

fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .map(PathBuf::from)
                .ok_or_else(|| format!("{} requires a value", flag))
        };

        match arg.as_str() {
            "--help" | "-h" => parsed.help = true,
            "--media-dir" => parsed.media_dir = Some(value("--media-dir")?),
            "--index" => parsed.index_page = Some(value("--index")?),
            "--log-dir" => parsed.log_dir = Some(value("--log-dir")?),
            flag if flag.starts_with("--") => return Err(format!("Unknown option: {}", flag)),
            addr if parsed.bind_addr.is_none() => parsed.bind_addr = Some(parse_bind_addr(addr)?),
            extra => return Err(format!("Unexpected argument: {}", extra)),
        }
    }

    Ok(parsed)
}

fn parse_bind_addr(arg: &str) -> Result<SocketAddr, String> {
    // Replace "localhost" with "127.0.0.1"
    let normalized = arg.replace("localhost", "127.0.0.1");

    // Try parsing as SocketAddr first (includes port)
    if let Ok(addr) = normalized.parse::<SocketAddr>() {
        return Ok(addr);
    }

    // Try parsing as IP address without port
    if let Ok(ip) = normalized.parse::<std::net::IpAddr>() {
        return Ok(SocketAddr::new(ip, DEFAULT_PORT));
    }

    Err(format!(
        "Invalid bind address: '{}'. Expected format: IP:PORT or IP or 'localhost'",
        arg
    ))
}

fn print_usage() {
    eprintln!("Usage: camcast [BIND_ADDR] [OPTIONS]");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  BIND_ADDR          Address to bind to (default: 0.0.0.0:8000)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --media-dir DIR    Where recordings are saved (default: /var/www/html/media)");
    eprintln!("  --index FILE       Page served at /index.html (default: /var/www/html/index.html)");
    eprintln!("  --log-dir DIR      Also write daily log files to DIR");
    eprintln!("  -h, --help         Show this help");
    eprintln!();
    eprintln!("Examples:");
    eprintln!("  camcast                           # binds to 0.0.0.0:8000");
    eprintln!("  camcast localhost                 # binds to 127.0.0.1:8000");
    eprintln!("  camcast 127.0.0.1:8080            # binds to 127.0.0.1:8080");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match parse_args(std::env::args().skip(1)) {
        Ok(args) => args,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if args.help {
        print_usage();
        return Ok(());
    }

    let _log_guard = init_logging(args.log_dir.as_deref())?;

    let mut server_config = ServerConfig::default();
    if let Some(addr) = args.bind_addr {
        server_config = server_config.bind(addr);
    }
    if let Some(index) = args.index_page {
        server_config = server_config.index_page(Some(index));
    }

    let mut capture_config = CaptureConfig::default();
    if let Some(dir) = args.media_dir {
        capture_config = capture_config.media_dir(dir);
    }

    tokio::fs::create_dir_all(&capture_config.media_dir).await?;
    tracing::info!(
        media_dir = %capture_config.media_dir.display(),
        preview = ?capture_config.preview,
        recording = ?capture_config.recording,
        "Starting camcast"
    );

    let broadcaster = Arc::new(FrameBroadcaster::new());
    let backend = RpiCamBackend::new(capture_config.clone());
    let controller = CaptureModeController::new(backend, Arc::clone(&broadcaster), capture_config);
    let server = CamServer::new(server_config, broadcaster, controller);
    tracing::info!(
        url = %format!("http://{}{}", server.bind_addr(), STREAM_PATH),
        "Live view"
    );

    let result = server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        })
        .await;

    if let Err(e) = &result {
        tracing::error!(error = %e, "Server error");
    }
    result.map_err(Into::into)
}
