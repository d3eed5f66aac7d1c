//! Tracing/logging setup shared by binaries and tests.

/// Initialize process-wide logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, UnknownLogFormat};
