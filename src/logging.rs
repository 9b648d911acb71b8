//! Tracing subscriber setup.
//!
//! Everything is written to stderr so stdout carries only command output.

use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl LogFormat {
    /// Unknown names fall back to `Pretty` with a warning on stderr.
    pub fn parse_or_default(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            "pretty" | "compact" | "text" => Self::Pretty,
            other => {
                eprintln!(
                    "Warning: unknown log format '{}', using 'pretty' (expected json or pretty)",
                    other
                );
                Self::Pretty
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `level`.
pub fn init(format: &str, level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let format = LogFormat::parse_or_default(format);

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_timer(UtcTime::rfc_3339())
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Pretty => registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }

    tracing::debug!(format = format.as_str(), level, "Logging initialized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_names() {
        assert_eq!(LogFormat::parse_or_default("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::parse_or_default(" text "), LogFormat::Pretty);
        assert_eq!(LogFormat::parse_or_default("yaml"), LogFormat::Pretty);
        assert_eq!(LogFormat::Json.as_str(), "json");
    }
}
