//! Tracing/logging initialization for tradebook binaries.

pub mod tracing_init;

pub use tracing_init::init;
