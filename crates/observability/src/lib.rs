//! Tracing/logging setup shared by the binary and tests.

pub mod tracing;

pub use tracing::{LogFormat, LoggingConfig};

/// Initialize process-wide tracing.
///
/// Safe to call multiple times; subsequent calls become no-ops.
pub fn init(config: &LoggingConfig) {
    tracing::init(config);
}
