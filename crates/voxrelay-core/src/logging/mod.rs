//! Structured logging with `tracing`.
//!
//! [`init_subscriber`] installs the process-wide subscriber: an `EnvFilter`
//! (where `RUST_LOG` takes precedence over the configured level) feeding either
//! compact human-readable output or JSON lines on stderr.
//!
//! Session work is wrapped in spans carrying `session_id` and `origin`, so
//! every event emitted by a session is attributable without repeating fields.

pub mod test_utils;

pub use test_utils::{CapturedLogs, capture_logs};

/// Output format for the stderr log stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Single-line human-readable output.
    #[default]
    Compact,
    /// One JSON object per line.
    Json,
}

/// Initialize the global tracing subscriber on stderr.
///
/// Call once at application startup. Subsequent calls are no-ops.
///
/// # Arguments
///
/// * `level` - Filter directive used when `RUST_LOG` is unset (e.g. `"info"`).
/// * `format` - Compact or JSON output.
pub fn init_subscriber(level: &str, format: LogFormat) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    // try_init is a no-op if a global subscriber is already set
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().with_current_span(true).try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_subscriber_does_not_panic() {
        init_subscriber("warn", LogFormat::Compact);
        init_subscriber("debug", LogFormat::Json);
    }

    #[test]
    fn default_format_is_compact() {
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }
}
