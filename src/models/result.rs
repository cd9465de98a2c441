//! Benchmark result data model

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::util::units::calculate_throughput_mbps;

/// Outcome of one completed write + read run.
///
/// Only built once both phases finished, so both speeds are always valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkResult {
    /// Sequential write throughput in MB/s (MiB per second)
    pub write_speed_mbps: f64,
    /// Sequential read throughput in MB/s (MiB per second)
    pub read_speed_mbps: f64,
    /// Bytes counted for each phase
    pub bytes_per_phase: u64,
    /// Time spent in the write phase
    pub write_elapsed: Duration,
    /// Time spent in the read phase
    pub read_elapsed: Duration,
}

impl BenchmarkResult {
    /// Build a result from the measured phase durations
    pub fn from_phases(bytes_per_phase: u64, write_elapsed: Duration, read_elapsed: Duration) -> Self {
        Self {
            write_speed_mbps: calculate_throughput_mbps(bytes_per_phase, write_elapsed),
            read_speed_mbps: calculate_throughput_mbps(bytes_per_phase, read_elapsed),
            bytes_per_phase,
            write_elapsed,
            read_elapsed,
        }
    }

    /// Two-line summary as shown to the operator
    pub fn summary(&self) -> String {
        format!(
            "Write speed: {:.2} MB/s\nRead speed: {:.2} MB/s",
            self.write_speed_mbps, self.read_speed_mbps
        )
    }

    /// Both speeds are finite and strictly positive
    pub fn is_valid(&self) -> bool {
        [self.write_speed_mbps, self.read_speed_mbps]
            .iter()
            .all(|v| v.is_finite() && *v > 0.0)
    }
}
