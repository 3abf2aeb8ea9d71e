//! Tracing and logging support.
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tracing output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TracingFormat {
    /// Human-readable format with colors.
    #[default]
    Pretty,

    /// Compact single-line format.
    Compact,

    /// JSON lines.
    Json,
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Log level filter.
    ///
    /// If None, uses RUST_LOG environment variable or defaults to "info".
    pub level: Option<tracing::Level>,

    pub format: TracingFormat,

    /// Include target module names in output.
    pub target: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: None,
            format: TracingFormat::Pretty,
            target: false,
        }
    }
}

fn filter_for(level: Option<tracing::Level>) -> EnvFilter {
    match level {
        Some(level) => EnvFilter::new(level.to_string()),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    }
}

/// Initialize the global subscriber.
///
/// # Environment Variables
///
/// - `RUST_LOG=debug` - Enable debug logs
/// - `RUST_LOG=vessel_host=trace` - Per-crate filtering
pub fn init_subscriber(config: TracingConfig) {
    let filter = filter_for(config.level);

    match config.format {
        TracingFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr)
                        .with_target(config.target),
                )
                .init();
        }
        TracingFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr)
                        .with_target(config.target),
                )
                .init();
        }
        TracingFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr)
                        .with_target(config.target),
                )
                .init();
        }
    }
}
