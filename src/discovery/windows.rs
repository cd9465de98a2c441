//! Windows discovery backed by WMI
//!
//! `Win32_DiskDrive` rows with a USB interface are followed through
//! `Win32_DiskDriveToDiskPartition` and `Win32_LogicalDiskToPartition`
//! association queries to their drive letters.

use serde::Deserialize;
use std::path::PathBuf;
use wmi::WMIConnection;

use super::{DeviceQueryProvider, DiskRow, PartitionRow, QuerySession, VolumeRow};
use crate::{Result, UsbSpeedError};

#[derive(Deserialize, Debug)]
struct Win32DiskDrive {
    #[serde(rename = "DeviceID")]
    device_id: String,
    #[serde(rename = "PNPDeviceID")]
    pnp_device_id: Option<String>,
    #[serde(rename = "Model")]
    model: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Win32DiskPartition {
    #[serde(rename = "DeviceID")]
    device_id: String,
}

#[derive(Deserialize, Debug)]
struct Win32LogicalDisk {
    #[serde(rename = "DeviceID")]
    device_id: String,
}

/// Escape a value for use inside a single-quoted WQL string
fn escape_wql(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// `E:` -> `E:\`
fn drive_root(device_id: &str) -> PathBuf {
    let trimmed = device_id.trim();
    if trimmed.is_empty() || trimmed.ends_with('\\') {
        PathBuf::from(trimmed)
    } else {
        PathBuf::from(format!("{}\\", trimmed))
    }
}

/// Open WMI connection. Dropping it releases the COM objects.
pub struct WmiSession {
    connection: WMIConnection,
}

impl WmiSession {
    fn query<T: serde::de::DeserializeOwned>(&self, wql: &str) -> Result<Vec<T>> {
        self.connection
            .raw_query(wql)
            .map_err(|e| UsbSpeedError::Discovery(format!("WMI query failed ({}): {}", wql, e)))
    }
}

impl QuerySession for WmiSession {
    fn usb_disks(&mut self) -> Result<Vec<DiskRow>> {
        let drives: Vec<Win32DiskDrive> = self.query(
            "SELECT DeviceID, PNPDeviceID, Model FROM Win32_DiskDrive WHERE InterfaceType = 'USB'",
        )?;

        Ok(drives
            .into_iter()
            .map(|d| DiskRow {
                device_id: d.device_id,
                hardware_id: d.pnp_device_id.unwrap_or_default(),
                model: d.model.unwrap_or_default(),
            })
            .collect())
    }

    fn partitions(&mut self, disk: &DiskRow) -> Result<Vec<PartitionRow>> {
        let partitions: Vec<Win32DiskPartition> = self.query(&format!(
            "ASSOCIATORS OF {{Win32_DiskDrive.DeviceID='{}'}} WHERE AssocClass = Win32_DiskDriveToDiskPartition",
            escape_wql(&disk.device_id)
        ))?;

        Ok(partitions
            .into_iter()
            .map(|p| PartitionRow {
                partition_id: p.device_id,
            })
            .collect())
    }

    fn logical_volumes(&mut self, partition: &PartitionRow) -> Result<Vec<VolumeRow>> {
        let volumes: Vec<Win32LogicalDisk> = self.query(&format!(
            "ASSOCIATORS OF {{Win32_DiskPartition.DeviceID='{}'}} WHERE AssocClass = Win32_LogicalDiskToPartition",
            escape_wql(&partition.partition_id)
        ))?;

        Ok(volumes
            .into_iter()
            .map(|v| VolumeRow {
                mount_path: drive_root(&v.device_id),
                volume_id: v.device_id,
            })
            .collect())
    }
}

/// Queries disks through WMI (`root\cimv2`)
#[derive(Debug, Clone, Default)]
pub struct WmiQueryProvider;

impl WmiQueryProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceQueryProvider for WmiQueryProvider {
    fn open_session(&self) -> Result<Box<dyn QuerySession + '_>> {
        let connection = WMIConnection::new()
            .map_err(|e| UsbSpeedError::Discovery(format!("Failed to connect to WMI: {}", e)))?;
        Ok(Box::new(WmiSession { connection }))
    }
}
