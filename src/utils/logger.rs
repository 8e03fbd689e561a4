//! Structured logging setup (§10): console always, plus an optional
//! daily-rotating file appender when a log file was requested.

use tracing::{info, Level};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Install the global subscriber. Returns the file appender's guard, which
/// must be held for the lifetime of the process or buffered lines are lost
/// on exit.
pub fn setup_logging(verbose: bool, log_file_dir: Option<&std::path::Path>, format: LogFormat) -> Result<Option<WorkerGuard>> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let env_filter = EnvFilter::builder().with_default_directive(level.into()).from_env_lossy();
    let registry = tracing_subscriber::registry().with(env_filter);

    let console_layer = match format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    let guard = match log_file_dir {
        Some(dir) => {
            let appender = rolling::RollingFileAppender::builder()
                .rotation(rolling::Rotation::DAILY)
                .filename_suffix("log")
                .build(dir)
                .map_err(|e| Error::config(format!("failed to create log file appender: {e}")))?;
            let (file_writer, guard) = non_blocking(appender);
            let file_layer = match format {
                LogFormat::Json => fmt::layer().json().with_writer(file_writer).boxed(),
                LogFormat::Compact => fmt::layer().compact().with_writer(file_writer).boxed(),
            };
            registry.with(console_layer).with(file_layer).init();
            Some(guard)
        }
        None => {
            registry.with(console_layer).init();
            None
        }
    };

    info!(verbose, "logging initialized");
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_compact() {
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }
}
