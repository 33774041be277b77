//! Diagnostic logging setup.
//!
//! Everything goes to stderr so stdout stays free for the JSON-lines call
//! protocol. `RUST_LOG` overrides the configured level.
//!
//! Log files, diagnostic and durable output alike, rotate daily through
//! [`daily_appender`].

use crate::config::LoggingConfig;
use crate::error::{BridgeError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Prefix of the daily diagnostic log files.
pub const LOG_FILE_PREFIX: &str = "capbridge-diag";

/// Rotated files kept per prefix; older ones are deleted on rollover.
pub const MAX_LOG_FILES: usize = 10;

/// Opens `<prefix>.YYYY-MM-DD.log` in `dir`, rotating at UTC midnight.
///
/// # Errors
///
/// Returns [`BridgeError::Io`] if `dir` cannot be created, or
/// [`BridgeError::Config`] if the appender cannot open its file.
pub fn daily_appender(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|e| BridgeError::Config(format!("cannot open log in {}: {e}", dir.display())))
}

/// Builds the filter: `RUST_LOG` if set and valid, else the configured level.
#[must_use]
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Installs the global subscriber.
///
/// Returns the file writer's guard when file logging is on; keep it alive
/// for the life of the process or buffered lines are lost.
///
/// # Errors
///
/// Returns [`BridgeError::Config`] if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = if config.file {
        let dir = config
            .dir
            .clone()
            .unwrap_or_else(crate::bridge_dirs::logs_dir);
        let appender = daily_appender(&dir, LOG_FILE_PREFIX)?;
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(writer);
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("tracing already initialised: {e}")))?;

    Ok(guard)
}
