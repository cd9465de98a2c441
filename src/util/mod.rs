//! Utility functions module
//!
//! Throughput arithmetic and human-readable formatting.

pub mod units;

// Re-export commonly used functions
pub use units::{calculate_throughput_mbps, format_bytes, format_throughput};
