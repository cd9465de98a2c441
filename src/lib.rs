//! USBSPEED - USB storage throughput tester
//!
//! Discovers USB-attached disks, resolves them to mounted volumes and
//! measures sequential write/read throughput with a disposable test file.

use thiserror::Error;

pub mod bench;
pub mod config;
pub mod discovery;
pub mod io;
pub mod models;
pub mod shell;
pub mod util;

pub use bench::{measure_throughput, ThroughputBenchmark};
pub use config::BenchmarkConfig;
pub use discovery::{list_usb_devices, UsbDeviceEnumerator};
pub use models::{BenchmarkResult, DeviceRecord};

// Common error types
#[derive(Debug, Error)]
pub enum UsbSpeedError {
    /// The OS device-query subsystem was unreachable or returned malformed data
    #[error("Device discovery failed: {0}")]
    Discovery(String),
    /// Benchmark invoked without a usable target
    #[error("No device selected")]
    NoDeviceSelected,
    /// Creating, opening, writing, reading or deleting the test file failed
    #[error("File access error: {message}")]
    IoAccess {
        message: String,
        #[source]
        source: std::io::Error,
    },
    /// Benchmark parameters rejected before any I/O
    #[error("Configuration error: {0}")]
    Config(String),
}

impl UsbSpeedError {
    /// Wrap an OS error with what was being attempted. The OS text is kept in the message.
    pub fn io_access(context: impl Into<String>, source: std::io::Error) -> Self {
        let context = context.into();
        UsbSpeedError::IoAccess {
            message: format!("{}: {}", context, source),
            source,
        }
    }

    /// True when the failure came from another handle holding the test file.
    pub fn is_file_locked(&self) -> bool {
        self.io_kind() == Some(std::io::ErrorKind::WouldBlock)
    }

    /// True when a phase deadline expired
    pub fn is_timed_out(&self) -> bool {
        self.io_kind() == Some(std::io::ErrorKind::TimedOut)
    }

    fn io_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            UsbSpeedError::IoAccess { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Result type alias for USBSPEED operations
pub type Result<T> = std::result::Result<T, UsbSpeedError>;

/// Error rendering for the presentation shell
pub mod error {
    use super::UsbSpeedError;

    /// Convert error to the message shown to the operator
    pub fn user_message(error: &UsbSpeedError) -> String {
        match error {
            UsbSpeedError::NoDeviceSelected => "Please select a device for testing.".to_string(),
            UsbSpeedError::IoAccess { .. } if error.is_file_locked() => format!(
                "{}. Another test may be running against this device.",
                error
            ),
            _ => error.to_string(),
        }
    }
}

pub const APP_NAME: &str = "usbspeed";
/// File created in the volume root for the duration of a run
pub const TEST_FILE_NAME: &str = "testfile.dat";
pub const DEFAULT_BLOCK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_ITERATIONS: u32 = 10;
