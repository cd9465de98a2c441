//! Benchmark configuration
//!
//! Parameters for a throughput run. Nothing here is persisted or read from
//! the environment; callers build a config in code and validate it.

use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::time::Duration;

use crate::{Result, UsbSpeedError, DEFAULT_BLOCK_SIZE, DEFAULT_ITERATIONS, TEST_FILE_NAME};

const MAX_BLOCK_SIZE: usize = 64 * 1024 * 1024;

/// Parameters for one throughput run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Size of the transfer buffer (in bytes)
    pub block_size: usize,
    /// Number of buffer transfers per phase
    pub iterations: u32,
    /// Name of the test file created in the volume root
    pub test_file_name: String,
    /// Force written data to the device before the write timer stops
    pub sync_writes: bool,
    /// Optional deadline for each phase
    pub phase_timeout: Option<Duration>,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            iterations: DEFAULT_ITERATIONS,
            test_file_name: TEST_FILE_NAME.to_string(),
            sync_writes: true,
            phase_timeout: None,
        }
    }
}

impl BenchmarkConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_test_file_name(mut self, name: impl Into<String>) -> Self {
        self.test_file_name = name.into();
        self
    }

    pub fn with_sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    pub fn with_phase_timeout(mut self, timeout: Duration) -> Self {
        self.phase_timeout = Some(timeout);
        self
    }

    /// Bytes transferred by each phase
    pub fn total_bytes(&self) -> u64 {
        self.block_size as u64 * u64::from(self.iterations)
    }

    /// Validate the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(UsbSpeedError::Config(
                "Block size must be greater than 0".to_string(),
            ));
        }

        if self.block_size > MAX_BLOCK_SIZE {
            return Err(UsbSpeedError::Config(format!(
                "Block size too large: {} bytes (max: {} bytes)",
                self.block_size, MAX_BLOCK_SIZE
            )));
        }

        if self.iterations == 0 {
            return Err(UsbSpeedError::Config(
                "Iteration count must be greater than 0".to_string(),
            ));
        }

        // The test file must land directly in the volume root
        let mut components = Path::new(&self.test_file_name).components();
        let plain_name = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !plain_name || self.test_file_name.contains(['/', '\\']) {
            return Err(UsbSpeedError::Config(format!(
                "Test file name must be a plain file name: {:?}",
                self.test_file_name
            )));
        }

        if self.phase_timeout.is_some_and(|t| t.is_zero()) {
            return Err(UsbSpeedError::Config(
                "Phase timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
