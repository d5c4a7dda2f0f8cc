//! Tracing subscriber setup

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

use crate::config::LogConfig;

/// Environment variable overriding the configured log filter
pub const LOG_ENV_VAR: &str = "TFMATRIX_LOG";

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),

    #[error("Invalid log file path: {0:?}")]
    InvalidPath(PathBuf),
}

/// Filter from `TFMATRIX_LOG`, or from the configured level when unset
pub fn build_filter(config: &LogConfig) -> Result<EnvFilter, LoggingError> {
    match std::env::var(LOG_ENV_VAR) {
        Ok(directives) if !directives.trim().is_empty() => Ok(EnvFilter::try_new(directives)?),
        _ => Ok(EnvFilter::try_new(&config.level)?),
    }
}

/// Install the global subscriber.
///
/// With a log file configured, output goes through a non-blocking writer
/// whose guard is returned; keep it alive until the process exits or
/// buffered lines are lost. Fails if a subscriber is already installed.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = build_filter(config)?;
    let registry = tracing_subscriber::registry().with(filter);

    let Some(path) = &config.file else {
        if config.json {
            registry
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        } else {
            registry
                .with(fmt::layer().with_writer(std::io::stderr))
                .try_init()?;
        }
        return Ok(None);
    };

    let file_name = path
        .file_name()
        .ok_or_else(|| LoggingError::InvalidPath(path.clone()))?;
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
        dir, file_name,
    ));
    if config.json {
        registry
            .with(fmt::layer().json().with_ansi(false).with_writer(writer))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_ansi(false).with_writer(writer))
            .try_init()?;
    }

    Ok(Some(guard))
}
