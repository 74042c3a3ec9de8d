// Tracing subscriber setup: console layer plus optional daily rolling file
use std::fs;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, time::ChronoUtc},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggerConfig;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Failed to prepare log directory: {0}")]
    LogDir(#[from] std::io::Error),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),
}

type FilteredRegistry = Layered<EnvFilter, Registry>;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `config.log_level`. The returned guard flushes the
/// file writer on drop and must be held for the life of the process.
pub fn init_logging(config: &LoggerConfig) -> Result<Option<WorkerGuard>, LoggerError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));

    let console: Box<dyn Layer<FilteredRegistry> + Send + Sync> = if config.json {
        fmt::layer()
            .with_target(false)
            .with_timer(ChronoUtc::rfc_3339())
            .with_ansi(false)
            .json()
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_timer(ChronoUtc::rfc_3339())
            .boxed()
    };

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(ChronoUtc::rfc_3339());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))?;

    Ok(guard)
}
