//! Fallback for platforms without a device query backend

use super::{DeviceQueryProvider, QuerySession};
use crate::{Result, UsbSpeedError};

#[derive(Debug, Clone, Default)]
pub struct UnsupportedQueryProvider;

impl DeviceQueryProvider for UnsupportedQueryProvider {
    fn open_session(&self) -> Result<Box<dyn QuerySession + '_>> {
        Err(UsbSpeedError::Discovery(format!(
            "USB device discovery is not supported on {}",
            std::env::consts::OS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reports_platform() {
        let err = UnsupportedQueryProvider.open_session().err().unwrap();
        assert!(err.to_string().contains(std::env::consts::OS));
    }
}
