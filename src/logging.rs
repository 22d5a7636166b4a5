//! Tracing configuration and log routing.
//!
//! The gateway logs to stdout using a compact formatter, and to a file. `JOBGATE_LOG_FILE`
//! selects the file; otherwise logs go to `logs/jobgate.log`. Job completions are logged from
//! background tasks, so the file writer is non-blocking.
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const DEFAULT_LOG_FILE: &str = "logs/jobgate.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Configure tracing subscribers for stdout and file logging.
///
/// `RUST_LOG` drives filtering and defaults to `info`. The worker guard lives in a static so
/// buffered lines are flushed for the whole process lifetime. Calling this twice is harmless;
/// the second subscriber is discarded.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = fmt::layer().with_target(false).compact();

    let file_layer = file_writer(&log_file_path()).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }
}

fn log_file_path() -> PathBuf {
    std::env::var_os("JOBGATE_LOG_FILE")
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

/// Returns `None` when the log directory cannot be created; stdout logging continues alone.
fn file_writer(path: &Path) -> Option<NonBlocking> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let file_name = path.file_name()?;
    if let Err(err) = std::fs::create_dir_all(&directory) {
        eprintln!("Failed to create log directory {}: {err}", directory.display());
        return None;
    }
    let appender = tracing_appender::rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
