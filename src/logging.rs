//! Logging setup for the binary
//!
//! Always logs to stderr. With a log directory, a daily-rolling file is
//! written as well through a non-blocking writer; keep the returned guard
//! alive for as long as the process should log.

use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix for rolled log files
pub const LOG_FILE_BASENAME: &str = "camcast.log";

/// Directive used when `RUST_LOG` is unset
pub const DEFAULT_DIRECTIVE: &str = "camcast=info";

const LOG_RETENTION_DAYS: u64 = 7;

/// Install the global subscriber
pub fn init_logging(log_dir: Option<&Path>) -> io::Result<Option<WorkerGuard>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(io::stderr);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            prune_old_logs(
                dir,
                Duration::from_secs(60 * 60 * 24 * LOG_RETENTION_DAYS),
            );

            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_BASENAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Remove rolled log files last modified before `max_age` ago
fn prune_old_logs(log_dir: &Path, max_age: Duration) -> usize {
    let Ok(entries) = std::fs::read_dir(log_dir) else {
        return 0;
    };
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_BASENAME));
        if !is_log {
            continue;
        }

        let Ok(modified) = entry.metadata().and_then(|m| m.modified()) else {
            continue;
        };

        if modified < cutoff && std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prune_keeps_fresh_and_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let fresh = dir.path().join("camcast.log.2026-10-18");
        let foreign = dir.path().join("notes.txt");
        std::fs::write(&fresh, "log").unwrap();
        std::fs::write(&foreign, "keep").unwrap();

        let removed = prune_old_logs(dir.path(), Duration::from_secs(3600));

        assert_eq!(removed, 0);
        assert!(fresh.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_prune_removes_expired_logs_only() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("camcast.log.2026-01-01");
        let foreign = dir.path().join("video.h264");
        std::fs::write(&old, "log").unwrap();
        std::fs::write(&foreign, "data").unwrap();

        // Zero max age: anything written before now is expired
        std::thread::sleep(Duration::from_millis(20));
        let removed = prune_old_logs(dir.path(), Duration::ZERO);

        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(foreign.exists());
    }

    #[test]
    fn test_prune_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(prune_old_logs(&dir.path().join("absent"), Duration::ZERO), 0);
    }
}
