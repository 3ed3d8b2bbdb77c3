//! Utility functions module
//!
//! Contains helpers for formatting durations, latencies and rates.

pub mod units;

// Re-export commonly used functions
pub use units::{calculate_ops_per_sec, format_duration, format_latency, format_ops};
