use std::fs;
use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::constants::DEFAULT_LOG_DIRECTIVE;

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    /// Directory for daily-rotated JSON logs; console only when unset
    pub log_dir: Option<PathBuf>,
}

/// Initializes console logging, plus JSON file logging when a directory is given.
///
/// The returned guard flushes the file writer on drop and must be kept alive.
pub fn init_logging(options: &LogOptions) -> std::io::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::daily(dir, "nginxlog-metrics.log");
            let (writer, guard) = tracing_appender::non_blocking(file_appender);
            (Some(fmt::layer().json().with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    // stdout carries command output
    let console_layer = fmt::layer().with_writer(std::io::stderr);

    // a subscriber may already be installed (tests, embedding processes)
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .try_init();

    Ok(guard)
}
