//! Logging setup
//!
//! stderr output filtered by `RUST_LOG` (or a verbosity-derived default), with
//! an optional daily-rolling log file.

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

const LOG_FILE_PREFIX: &str = "todo-sync.log";

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "todo_sync=warn",
        1 => "todo_sync=info",
        2 => "todo_sync=debug",
        _ => "debug",
    }
}

/// Install the global subscriber
///
/// Keep the returned guard alive for the life of the process so buffered
/// file output is flushed.
pub fn init(verbosity: u8, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbosity)));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(file_layer)
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}
