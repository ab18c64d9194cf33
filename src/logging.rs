//! Log subscriber setup

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry};

use crate::config::{LogConfig, LogFormat};

/// Keeps the background log writer alive; logs are flushed when dropped
pub struct LoggingGuard {
    _guard: WorkerGuard,
}

/// Build the filter from `RUST_LOG`, falling back to the configured level
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

fn build_layer(
    format: LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) -> Box<dyn Layer<Registry> + Send + Sync> {
    match format {
        LogFormat::Text => Box::new(
            tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_target(true)
                .with_ansi(false),
        ),
        LogFormat::Json => Box::new(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_current_span(true),
        ),
    }
}

/// Install the global subscriber writing to stdout.
///
/// Returns an error if a subscriber is already installed.
pub fn init(config: &LogConfig) -> anyhow::Result<LoggingGuard> {
    let (writer, guard) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(build_layer(config.format, writer))
        .with(build_filter(&config.level))
        .try_init()?;

    Ok(LoggingGuard { _guard: guard })
}

