//! Tracing/logging initialization.
//!
//! JSON logs with timestamps, filtered via `RUST_LOG`. Posting-engine spans
//! (`post`, store transactions) carry tenant and document ids as fields, so
//! one grep over the log stream follows a document through its posting.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
