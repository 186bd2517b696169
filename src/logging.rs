//! Logging initialisation for ghdsu.
//!
//! stderr output is always on, filtered by `RUST_LOG` (default `warn`).
//! File logging to `<logs>/ghdsu.log` is on when `[logging] file = true`
//! (the default) or `GHDSU_LOG=1`; `GHDSU_LOG=0` turns it off.
//!
//! Returns a guard that must be kept alive for the duration of the process
//! so that buffered log lines are flushed on exit.

use std::path::Path;

use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;
use crate::paths::LOG_FILE;

pub struct LogGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
}

/// Whether the file layer should be installed.
pub fn file_logging_enabled(config: &LoggingConfig, env: Option<&str>) -> bool {
    match env {
        Some("1") => true,
        Some("0") => false,
        _ => config.file,
    }
}

/// Initialise the global tracing subscriber.
///
/// Call once from `main`, store the returned `LogGuard` in a local variable
/// for the duration of the process.
pub fn init(config: &LoggingConfig, logs_dir: Option<&Path>) -> LogGuard {
    let env = std::env::var("GHDSU_LOG").ok();
    let dir = logs_dir.filter(|_| file_logging_enabled(config, env.as_deref()));

    let file_guard = match dir.and_then(|dir| std::fs::create_dir_all(dir).ok().map(|_| dir)) {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::never(dir, LOG_FILE);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(EnvFilter::new("info"));

            tracing_subscriber::registry()
                .with(
                    fmt::layer().with_writer(std::io::stderr).with_filter(
                        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
                    ),
                )
                .with(file_layer)
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();

            None
        }
    };

    LogGuard {
        _file_guard: file_guard,
    }
}
