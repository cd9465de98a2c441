//! Benchmark engine module
//!
//! Contains the sequential write/read throughput run and its progress
//! reporting types.

pub mod sequential;

// Re-export commonly used types
pub use sequential::{measure_throughput, BenchmarkState, ProgressUpdate, ThroughputBenchmark};
