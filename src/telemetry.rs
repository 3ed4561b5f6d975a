//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Output format for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    Json,

    /// Human-readable, one line per event
    #[default]
    Pretty,
}

/// Initialize tracing/logging for the process.
///
/// Events go to stderr so they never mix with CSV on stdout. The filter comes
/// from `RUST_LOG` and defaults to `info`. Safe to call multiple times
/// (subsequent calls are no-ops).
pub fn init(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder
            .json()
            .with_timer(tracing_subscriber::fmt::time::SystemTime)
            .with_target(true)
            .try_init(),
        LogFormat::Pretty => builder.with_target(false).try_init(),
    };
}
