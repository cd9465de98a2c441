//! USB device discovery
//!
//! Walks disk -> partition -> mounted volume associations reported by a
//! platform query provider and flattens them into [`DeviceRecord`]s. The
//! traversal here is platform-neutral; the OS-specific queries live in the
//! provider submodules.

use std::path::PathBuf;
use tracing::debug;

use crate::models::DeviceRecord;
use crate::Result;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

#[cfg(not(any(target_os = "linux", windows)))]
pub mod unsupported;

#[cfg(target_os = "linux")]
pub use linux::LsblkQueryProvider as PlatformQueryProvider;

#[cfg(windows)]
pub use windows::WmiQueryProvider as PlatformQueryProvider;

#[cfg(not(any(target_os = "linux", windows)))]
pub use unsupported::UnsupportedQueryProvider as PlatformQueryProvider;

/// A disk attached over USB
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskRow {
    pub device_id: String,
    pub hardware_id: String,
    pub model: String,
}

/// A partition residing on a disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionRow {
    pub partition_id: String,
}

/// A logical volume mounted from a partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeRow {
    pub volume_id: String,
    pub mount_path: PathBuf,
}

/// Access to the OS device-management query subsystem
pub trait DeviceQueryProvider {
    /// Open a query session. Fails with `Discovery` if the subsystem is unavailable.
    fn open_session(&self) -> Result<Box<dyn QuerySession + '_>>;
}

/// An open query handle. Dropping it releases the OS resources.
pub trait QuerySession {
    /// Disks whose transport is USB, in OS query order
    fn usb_disks(&mut self) -> Result<Vec<DiskRow>>;

    /// Partitions residing on `disk`
    fn partitions(&mut self, disk: &DiskRow) -> Result<Vec<PartitionRow>>;

    /// Logical volumes mounted from `partition`
    fn logical_volumes(&mut self, partition: &PartitionRow) -> Result<Vec<VolumeRow>>;
}

impl<P: DeviceQueryProvider + ?Sized> DeviceQueryProvider for &P {
    fn open_session(&self) -> Result<Box<dyn QuerySession + '_>> {
        (**self).open_session()
    }
}

/// Enumerates USB storage devices through a query provider
pub struct UsbDeviceEnumerator<P> {
    provider: P,
}

impl<P: DeviceQueryProvider> UsbDeviceEnumerator<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    /// One record per (disk, partition, mounted volume) chain.
    ///
    /// Any query failure fails the whole call; no partial list is returned.
    /// The query session is released before returning on every path.
    pub fn list(&self) -> Result<Vec<DeviceRecord>> {
        let mut session = self.provider.open_session()?;
        let records = collect_records(session.as_mut());
        drop(session);

        if let Ok(records) = &records {
            debug!(count = records.len(), "USB device enumeration finished");
        }
        records
    }
}

fn collect_records(session: &mut dyn QuerySession) -> Result<Vec<DeviceRecord>> {
    let mut records = Vec::new();

    for disk in session.usb_disks()? {
        let label = match disk.model.trim() {
            "" => disk.device_id.clone(),
            model => model.to_string(),
        };

        let partitions = session.partitions(&disk)?;
        if partitions.is_empty() {
            debug!(device = %disk.device_id, "USB disk has no partitions");
        }

        for partition in partitions {
            let volumes = session.logical_volumes(&partition)?;
            if volumes.is_empty() {
                debug!(
                    device = %disk.device_id,
                    partition = %partition.partition_id,
                    "Partition has no mounted volume"
                );
            }

            for volume in volumes {
                if volume.mount_path.as_os_str().is_empty() {
                    continue;
                }
                records.push(DeviceRecord::new(
                    disk.device_id.clone(),
                    disk.hardware_id.clone(),
                    label.clone(),
                    volume.mount_path,
                ));
            }
        }
    }

    Ok(records)
}

/// List USB storage devices using the provider for the current platform
pub fn list_usb_devices() -> Result<Vec<DeviceRecord>> {
    UsbDeviceEnumerator::new(PlatformQueryProvider::default()).list()
}
