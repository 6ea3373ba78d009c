use std::env;
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use hash_herder_core::config::{expand_tilde, LoggingConfig};

/// Install the global subscriber: stdout always, plus a plain-text file when
/// `logging.file` is set. The returned guard must live until exit or
/// buffered file lines are lost.
///
/// Level precedence: `--verbose`, then `--log-level`, then `RUST_LOG`, then
/// `logging.level`.
pub fn init_logger(
    config: &LoggingConfig,
    level_override: Option<&str>,
    verbose: bool,
) -> Option<WorkerGuard> {
    let filter = if verbose {
        "debug".to_string()
    } else if let Some(level) = level_override {
        level.to_string()
    } else {
        env::var("RUST_LOG").unwrap_or_else(|_| config.level.clone())
    };
    let filter_layer = EnvFilter::try_new(&filter).unwrap_or_else(|_| EnvFilter::new("info"));

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .without_time()
        .with_ansi(true);

    let mut file_error = None;
    let (file_layer, guard) = match config.file.as_deref().map(expand_tilde) {
        Some(path) => match open_log_file(&path) {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                file_error = Some(format!("{}: {}", path.display(), e));
                (None, None)
            }
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(stdout_layer)
        .with(file_layer)
        .with(filter_layer)
        .init();

    if let Some(err) = file_error {
        warn!("Could not open log file {}, logging to stdout only", err);
    } else if guard.is_some() {
        info!("Tracing is configured for stdout and file logging.");
    }

    guard
}

fn open_log_file(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::OpenOptions::new().create(true).append(true).open(path)
}
