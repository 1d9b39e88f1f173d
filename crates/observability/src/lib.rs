//! Tracing/logging setup shared by anything embedding the ledger.

pub use crate::tracing::LogFormat;

/// Initialize process-wide logging.
///
/// Format comes from `STORELEDGER_LOG_FORMAT` (`json` or `pretty`, default
/// `json`); filtering from `RUST_LOG` (default `info`). Safe to call multiple
/// times; subsequent calls are no-ops.
pub fn init() {
    tracing::init_with(LogFormat::from_env());
}

/// Initialize with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init_with(format);
}

/// Tracing configuration (filters, layers).
pub mod tracing;
