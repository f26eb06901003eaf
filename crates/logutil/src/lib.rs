//! Utilities for logging.

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact single-line output meant for a terminal.
    #[default]
    HumanReadable,
    /// One JSON object per event.
    Json,
}

/// Build the filter for the global subscriber.
///
/// `RUST_LOG` takes precedence when set and valid, otherwise everything at
/// `default_level` and above is emitted.
pub fn env_filter(default_level: Level) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.as_str().to_ascii_lowercase()))
}

/// Configure the global tracing subscriber.
///
/// Only the first call in a process installs a subscriber; later calls are
/// no-ops so tests and binaries can both call this freely.
pub fn configure_global_logger<W>(default_level: Level, format: LogFormat, make_writer: W)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_writer(make_writer)
        .with_target(false);

    let _ = match format {
        LogFormat::HumanReadable => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
