//! Tracing setup for hosts embedding the companion core.

use crate::config::LoggingConfig;
use crate::error::{Result, SeraphError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// Install the global subscriber: stderr output plus, when `log_dir` is set,
/// a daily-rolling file.
///
/// `RUST_LOG` overrides `config.level`. Keep the returned guard alive for as
/// long as file logging should flush.
///
/// # Errors
///
/// Returns [`SeraphError::Config`] if a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.level)));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .map_err(|e| SeraphError::Config(format!("tracing already initialised: {e}")))?;
    Ok(guard)
}

/// Scope a bare level to this crate and quiet the HTTP stack.
fn default_directive(level: &str) -> String {
    let level = level.trim();
    if level.contains('=') || level.contains(',') {
        level.to_owned()
    } else {
        format!("seraph={level},reqwest=warn,hyper=warn")
    }
}
