//! Tracing/logging setup shared by every binary and test harness.

pub mod tracing;

pub use self::tracing::{LogConfig, init};
