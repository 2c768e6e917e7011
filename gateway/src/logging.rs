//! # Structured Logging
//!
//! Sets up the `tracing` subscriber: pretty output for terminals, JSON
//! lines for log aggregation, `RUST_LOG` filtering on top of a default
//! directive. Everything goes to stderr.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored. For local development.
    Pretty,
    /// JSON lines. For production aggregation.
    Json,
}

impl LogFormat {
    /// Parses "json" or "pretty" (case-insensitive); anything else falls
    /// back to `Pretty`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Initializes the global subscriber. Call exactly once, early in `main`.
///
/// `default_level` applies when `RUST_LOG` is unset, e.g.
/// `"marquee_gateway=info,marquee_core=info,tower_http=debug"`.
pub fn init_logging(default_level: &str, format: LogFormat) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(true))
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true))
                .init();
        }
    }

    tracing::info!("logging initialized (format={:?})", format);
}
