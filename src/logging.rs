//! Tracing subscriber setup for the CLI and server.
//!
//! `RUST_LOG` picks the filter (default `info`). Output goes to stderr so
//! command results on stdout stay machine-readable. Backend errors that the
//! dispatcher swallows are emitted on [`DIAGNOSTICS_TARGET`]; filter on it
//! with `RUST_LOG=duowallet::diagnostics=warn`.

use tracing_subscriber::{fmt, EnvFilter};

pub use crate::dispatcher::DIAGNOSTICS_TARGET;

pub const ENV_LOG_JSON: &str = "DUOWALLET_LOG_JSON";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    /// One JSON object per line.
    Json,
}

impl LogFormat {
    /// `DUOWALLET_LOG_JSON=1` selects JSON; anything else is pretty.
    pub fn from_env() -> Self {
        match std::env::var(ENV_LOG_JSON).as_deref() {
            Ok("1") => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

pub fn init_logging() {
    init_logging_with(LogFormat::from_env());
}

/// Installs the global subscriber. A second call is a no-op.
pub fn init_logging_with(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter).with_writer(std::io::stderr);

    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
