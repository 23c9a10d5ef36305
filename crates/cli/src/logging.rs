//! Tracing subscriber setup
//!
//! Level precedence: `-v`/`-q` flags, then `RUST_LOG`, then `log.level`
//! from the config. With a log file, events are also written there through
//! a non-blocking appender.

use crate::config::LogConfig;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directive for a verbosity offset (`-v` is +1, `-q` is -1)
fn level_for(verbosity: i8) -> Option<&'static str> {
    match verbosity {
        0 => None,
        1 => Some("debug"),
        v if v >= 2 => Some("trace"),
        -1 => Some("warn"),
        _ => Some("error"),
    }
}

fn build_filter(config: &LogConfig, verbosity: i8) -> EnvFilter {
    if let Some(level) = level_for(verbosity) {
        return EnvFilter::new(level);
    }
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber
///
/// Keep the returned guard alive until exit so buffered file output is
/// flushed.
pub fn init(config: &LogConfig, verbosity: i8, log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = build_filter(config, verbosity);
    let log_file = log_file.or(config.file.as_deref());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent,
                _ => Path::new("."),
            };
            let name = path
                .file_name()
                .with_context(|| format!("Log file has no file name: {}", path.display()))?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    Ok(guard)
}
