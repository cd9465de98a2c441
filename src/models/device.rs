use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One (disk, partition, mounted volume) chain found during enumeration.
///
/// A disk with several mounted partitions yields several records that share
/// `device_id`, `hardware_id` and `label` and differ in `mount_path`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// OS identifier of the physical disk (`\\.\PHYSICALDRIVE1`, `/dev/sdb`)
    pub device_id: String,
    /// Plug-and-play / hardware identifier
    pub hardware_id: String,
    /// Model string shown to the operator
    pub label: String,
    /// Root of the mounted volume
    pub mount_path: PathBuf,
}

impl DeviceRecord {
    pub fn new(
        device_id: impl Into<String>,
        hardware_id: impl Into<String>,
        label: impl Into<String>,
        mount_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            hardware_id: hardware_id.into(),
            label: label.into(),
            mount_path: mount_path.into(),
        }
    }

    /// Whether the record points at a usable volume
    pub fn is_mounted(&self) -> bool {
        !self.mount_path.as_os_str().is_empty()
    }

    /// Label plus mount path, for selection lists
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.label, self.mount_path.display())
    }
}
