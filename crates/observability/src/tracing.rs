//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

pub const LOG_FORMAT_VAR: &str = "STORELEDGER_LOG_FORMAT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line, for log shipping.
    #[default]
    Json,
    /// Human-readable multi-line output for local runs.
    Pretty,
}

impl LogFormat {
    pub fn from_env() -> Self {
        std::env::var(LOG_FORMAT_VAR)
            .ok()
            .map(|v| Self::parse(&v))
            .unwrap_or_default()
    }

    /// Unknown values fall back to JSON.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Install the global subscriber. Subsequent calls are no-ops.
pub fn init_with(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    // try_init fails only when a global subscriber is already set.
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
    };
}
