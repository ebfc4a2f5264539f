//! Tracing subscriber setup.
//!
//! `RUST_LOG` wins over the configured level. With `logging.to_file` the same
//! events are also written to a daily-rotated file without ANSI colors.

use std::path::Path;

use morphika_types::models::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{AppError, AppResult};

const LOG_FILE_PREFIX: &str = "morphika.log";

/// Install the global subscriber.
///
/// The returned guard must stay alive for the file writer to flush.
pub fn init_logger(config: &LoggingConfig, log_dir: Option<&Path>) -> AppResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AppError::Config(format!("Invalid log level '{}': {}", config.level, e)))?;

    let (file_layer, guard) = match log_dir {
        Some(dir) if config.to_file => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(writer).with_ansi(false)), Some(guard))
        },
        _ => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()
        .map_err(|e| AppError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
