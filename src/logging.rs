//! Tracing configuration and log routing.
//!
//! The server logs to stdout with a compact formatter and mirrors everything into a file:
//! `PDFQA_LOG_FILE` when set, otherwise `logs/pdfqa.log`. The CLI prints answers on stdout,
//! so it routes logs to stderr and skips the file.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where log records are written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogOutput {
    /// Compact stdout plus the non-blocking file layer (server mode).
    StdoutAndFile,
    /// Compact stderr only (CLI mode).
    Stderr,
}

/// Configure tracing for the HTTP server.
pub fn init_tracing() {
    init_tracing_with(LogOutput::StdoutAndFile);
}

/// Configure tracing subscribers for the requested output.
///
/// Respects `RUST_LOG` for filtering and defaults to `info` (`warn` for the CLI).
pub fn init_tracing_with(output: LogOutput) {
    let default_level = match output {
        LogOutput::StdoutAndFile => "info",
        LogOutput::Stderr => "warn",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(env_filter);

    match output {
        LogOutput::Stderr => {
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact();
            let _ = registry.with(stderr_layer).try_init();
        }
        LogOutput::StdoutAndFile => {
            let stdout_layer = fmt::layer().with_target(false).compact();
            let registry = registry.with(stdout_layer);
            if let Some(writer) = configure_file_writer() {
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact();
                let _ = registry.with(file_layer).try_init();
            } else {
                let _ = registry.try_init();
            }
        }
    }
}

/// Build a non-blocking writer for file logging.
///
/// Returns `None` when the logs directory cannot be created or the target file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var("PDFQA_LOG_FILE") {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Failed to open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            std::fs::create_dir_all("logs")
                .map_err(|err| eprintln!("Failed to create logs directory: {err}"))
                .ok()?;
            tracing_appender::non_blocking(tracing_appender::rolling::never("logs", "pdfqa.log"))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
