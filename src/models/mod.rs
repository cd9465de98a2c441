//! Data models module
//!
//! Discovered device records and benchmark results.

pub mod device;
pub mod result;

// Re-export commonly used types
pub use device::DeviceRecord;
pub use result::BenchmarkResult;
