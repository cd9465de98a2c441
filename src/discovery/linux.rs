//! Linux discovery backed by `lsblk --json`
//!
//! A USB disk is a top-level `disk` node with `tran == "usb"`. Its `part`
//! children are the partitions; a disk without partitions (superfloppy
//! layout) stands in as its own single partition. The mounted volumes of a
//! partition are its own mountpoint plus those of any crypt or LVM nodes
//! stacked on top of it.

use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

use super::{DeviceQueryProvider, DiskRow, PartitionRow, QuerySession, VolumeRow};
use crate::{Result, UsbSpeedError};

// PATH is missing from lsblk before util-linux 2.33; device paths are built from NAME
const LSBLK_COLUMNS: &str = "NAME,TYPE,TRAN,MODEL,VENDOR,SERIAL,MOUNTPOINT";
const BY_ID_DIR: &str = "/dev/disk/by-id";

#[derive(Debug, Deserialize)]
struct LsblkOutput {
    #[serde(default)]
    blockdevices: Vec<BlockDevice>,
}

#[derive(Debug, Clone, Deserialize)]
struct BlockDevice {
    name: String,
    #[serde(rename = "type")]
    kind: String,
    tran: Option<String>,
    model: Option<String>,
    vendor: Option<String>,
    serial: Option<String>,
    mountpoint: Option<String>,
    #[serde(default)]
    children: Vec<BlockDevice>,
}

impl BlockDevice {
    /// Device-mapper nodes (crypt, LVM) live under /dev/mapper
    fn dev_path(&self) -> String {
        match self.kind.as_str() {
            "crypt" | "lvm" | "dm" => format!("/dev/mapper/{}", self.name),
            _ => format!("/dev/{}", self.name),
        }
    }

    fn is_usb_disk(&self) -> bool {
        self.kind == "disk" && self.tran.as_deref() == Some("usb")
    }

    fn label(&self) -> String {
        [&self.vendor, &self.model]
            .into_iter()
            .filter_map(|s| s.as_deref().map(str::trim))
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// `usb-Vendor_Model_Serial`, the shape udev uses under /dev/disk/by-id
    fn synthetic_hardware_id(&self) -> String {
        let parts: Vec<String> = [&self.vendor, &self.model, &self.serial]
            .into_iter()
            .filter_map(|s| s.as_deref().map(str::trim))
            .filter(|s| !s.is_empty())
            .map(|s| s.replace(' ', "_"))
            .collect();
        if parts.is_empty() {
            format!("usb-{}", self.name)
        } else {
            format!("usb-{}", parts.join("_"))
        }
    }

    fn find(&self, dev_path: &str) -> Option<&BlockDevice> {
        if self.dev_path() == dev_path {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find(dev_path))
    }

    /// Mountpoints of this node and everything stacked on it
    fn collect_mounts(&self, out: &mut Vec<VolumeRow>) {
        if let Some(mount) = self.mountpoint.as_deref() {
            // Skips "[SWAP]" and similar pseudo mountpoints
            if mount.starts_with('/') {
                out.push(VolumeRow {
                    volume_id: self.dev_path(),
                    mount_path: PathBuf::from(mount),
                });
            }
        }
        for child in &self.children {
            child.collect_mounts(out);
        }
    }
}

/// Parsed `lsblk` snapshot of the USB disks
pub struct LsblkSession {
    disks: Vec<BlockDevice>,
    hardware_ids: HashMap<String, String>,
}

impl LsblkSession {
    /// Parse `lsblk --json` output
    pub fn parse(json: &[u8]) -> Result<Self> {
        let output: LsblkOutput = serde_json::from_slice(json)
            .map_err(|e| UsbSpeedError::Discovery(format!("Malformed lsblk output: {}", e)))?;

        let disks = output
            .blockdevices
            .into_iter()
            .filter(BlockDevice::is_usb_disk)
            .collect();

        Ok(Self {
            disks,
            hardware_ids: HashMap::new(),
        })
    }

    /// Device path -> `/dev/disk/by-id` name
    pub fn with_hardware_ids(mut self, hardware_ids: HashMap<String, String>) -> Self {
        self.hardware_ids = hardware_ids;
        self
    }

    fn disk(&self, device_id: &str) -> Result<&BlockDevice> {
        self.disks
            .iter()
            .find(|d| d.dev_path() == device_id)
            .ok_or_else(|| UsbSpeedError::Discovery(format!("Unknown disk {}", device_id)))
    }

    fn node(&self, dev_path: &str) -> Result<&BlockDevice> {
        self.disks
            .iter()
            .find_map(|d| d.find(dev_path))
            .ok_or_else(|| UsbSpeedError::Discovery(format!("Unknown partition {}", dev_path)))
    }
}

impl QuerySession for LsblkSession {
    fn usb_disks(&mut self) -> Result<Vec<DiskRow>> {
        Ok(self
            .disks
            .iter()
            .map(|disk| {
                let device_id = disk.dev_path();
                let hardware_id = self
                    .hardware_ids
                    .get(&device_id)
                    .cloned()
                    .unwrap_or_else(|| disk.synthetic_hardware_id());
                DiskRow {
                    device_id,
                    hardware_id,
                    model: disk.label(),
                }
            })
            .collect())
    }

    fn partitions(&mut self, disk: &DiskRow) -> Result<Vec<PartitionRow>> {
        let node = self.disk(&disk.device_id)?;
        let parts: Vec<PartitionRow> = node
            .children
            .iter()
            .filter(|c| c.kind == "part")
            .map(|c| PartitionRow {
                partition_id: c.dev_path(),
            })
            .collect();

        if parts.is_empty() {
            // Superfloppy: the file system sits directly on the disk
            return Ok(vec![PartitionRow {
                partition_id: node.dev_path(),
            }]);
        }
        Ok(parts)
    }

    fn logical_volumes(&mut self, partition: &PartitionRow) -> Result<Vec<VolumeRow>> {
        let node = self.node(&partition.partition_id)?;
        let mut volumes = Vec::new();
        if node.kind == "disk" {
            // Only the disk's own mount and non-partition stacks count here
            if let Some(mount) = node.mountpoint.as_deref().filter(|m| m.starts_with('/')) {
                volumes.push(VolumeRow {
                    volume_id: node.dev_path(),
                    mount_path: PathBuf::from(mount),
                });
            }
            for child in node.children.iter().filter(|c| c.kind != "part") {
                child.collect_mounts(&mut volumes);
            }
        } else {
            node.collect_mounts(&mut volumes);
        }
        Ok(volumes)
    }
}

/// Map `/dev/sdX` to the `usb-*` entry that links to it
fn read_by_id(dir: &Path) -> HashMap<String, String> {
    let mut ids = HashMap::new();
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!(dir = %dir.display(), error = %err, "No by-id directory");
            return ids;
        }
    };

    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("usb-") || name.contains("-part") {
            continue;
        }
        if let Ok(target) = fs::canonicalize(entry.path()) {
            ids.insert(target.to_string_lossy().into_owned(), name);
        }
    }
    ids
}

/// Queries block devices through `lsblk`
#[derive(Debug, Clone)]
pub struct LsblkQueryProvider {
    by_id_dir: PathBuf,
}

impl Default for LsblkQueryProvider {
    fn default() -> Self {
        Self {
            by_id_dir: PathBuf::from(BY_ID_DIR),
        }
    }
}

impl LsblkQueryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve hardware ids from another by-id directory
    pub fn with_by_id_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.by_id_dir = dir.into();
        self
    }
}

impl DeviceQueryProvider for LsblkQueryProvider {
    fn open_session(&self) -> Result<Box<dyn QuerySession + '_>> {
        let output = Command::new("lsblk")
            .args(["--json", "-o", LSBLK_COLUMNS])
            .output()
            .map_err(|e| UsbSpeedError::Discovery(format!("Failed to run lsblk: {}", e)))?;

        if !output.status.success() {
            return Err(UsbSpeedError::Discovery(format!(
                "lsblk exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let session = LsblkSession::parse(&output.stdout)?
            .with_hardware_ids(read_by_id(&self.by_id_dir));
        Ok(Box::new(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::UsbDeviceEnumerator;
    use tempfile::tempdir;

    const FIXTURE: &str = r#"{
       "blockdevices": [
          {"name":"nvme0n1", "type":"disk", "tran":"nvme", "model":"Samsung SSD 980", "vendor":null, "serial":"S123", "mountpoint":null,
             "children": [
                {"name":"nvme0n1p1", "type":"part", "tran":"nvme", "model":null, "vendor":null, "serial":null, "mountpoint":"/"}
             ]
          },
          {"name":"sdb", "type":"disk", "tran":"usb", "model":"DataTraveler 3.0", "vendor":"Kingston", "serial":"60A44C41", "mountpoint":null,
             "children": [
                {"name":"sdb1", "type":"part", "tran":null, "model":null, "vendor":null, "serial":null, "mountpoint":"/media/user/KINGSTON"},
                {"name":"sdb2", "type":"part", "tran":null, "model":null, "vendor":null, "serial":null, "mountpoint":null},
                {"name":"sdb3", "type":"part", "tran":null, "model":null, "vendor":null, "serial":null, "mountpoint":"[SWAP]"}
             ]
          },
          {"name":"sdc", "type":"disk", "tran":"usb", "model":"Card Reader", "vendor":"Generic ", "serial":null, "mountpoint":"/media/user/SDCARD"},
          {"name":"sdd", "type":"disk", "tran":"usb", "model":"Extreme", "vendor":"SanDisk", "serial":"AA01", "mountpoint":null,
             "children": [
                {"name":"sdd1", "type":"part", "tran":null, "model":null, "vendor":null, "serial":null, "mountpoint":null,
                   "children": [
                      {"name":"luks-1f2e", "type":"crypt", "tran":null, "model":null, "vendor":null, "serial":null, "mountpoint":"/media/user/secure"}
                   ]
                }
             ]
          },
          {"name":"sde", "type":"disk", "tran":"usb", "model":null, "vendor":null, "serial":null, "mountpoint":null}
       ]
    }"#;

    struct FixtureProvider(&'static str);

    impl DeviceQueryProvider for FixtureProvider {
        fn open_session(&self) -> Result<Box<dyn QuerySession + '_>> {
            let mut ids = HashMap::new();
            ids.insert(
                "/dev/sdb".to_string(),
                "usb-Kingston_DataTraveler_3.0_60A44C41-0:0".to_string(),
            );
            Ok(Box::new(
                LsblkSession::parse(self.0.as_bytes())?.with_hardware_ids(ids),
            ))
        }
    }

    #[test]
    fn test_parse_fixture() {
        let records = UsbDeviceEnumerator::new(FixtureProvider(FIXTURE)).list().unwrap();
        let mounts: Vec<_> = records
            .iter()
            .map(|r| r.mount_path.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            mounts,
            ["/media/user/KINGSTON", "/media/user/SDCARD", "/media/user/secure"]
        );

        assert_eq!(records[0].device_id, "/dev/sdb");
        assert_eq!(records[0].label, "Kingston DataTraveler 3.0");
        assert_eq!(records[0].hardware_id, "usb-Kingston_DataTraveler_3.0_60A44C41-0:0");

        assert_eq!(records[1].label, "Generic Card Reader");
        assert_eq!(records[1].hardware_id, "usb-Generic_Card_Reader");
        assert_eq!(records[2].hardware_id, "usb-SanDisk_Extreme_AA01");
    }

    #[test]
    fn test_non_usb_disks_are_skipped() {
        let mut session = LsblkSession::parse(FIXTURE.as_bytes()).unwrap();
        let disks = session.usb_disks().unwrap();
        assert!(disks.iter().all(|d| d.device_id != "/dev/nvme0n1"));
        assert_eq!(disks.len(), 4);
    }

    #[test]
    fn test_superfloppy_disk_is_its_own_partition() {
        let mut session = LsblkSession::parse(FIXTURE.as_bytes()).unwrap();
        let disk = DiskRow {
            device_id: "/dev/sdc".into(),
            hardware_id: String::new(),
            model: String::new(),
        };
        let parts = session.partitions(&disk).unwrap();
        assert_eq!(parts, vec![PartitionRow { partition_id: "/dev/sdc".into() }]);
    }

    #[test]
    fn test_device_paths_built_from_name() {
        assert!(!LSBLK_COLUMNS.split(',').any(|c| c == "PATH"));

        let json = r#"{"blockdevices":[{"name":"sdf","type":"disk","tran":"usb","mountpoint":"/mnt/f"}]}"#;
        let mut session = LsblkSession::parse(json.as_bytes()).unwrap();
        let disks = session.usb_disks().unwrap();
        assert_eq!(disks[0].device_id, "/dev/sdf");
        assert_eq!(disks[0].hardware_id, "usb-sdf");
        assert_eq!(disks[0].model, "");
    }

    #[test]
    fn test_crypt_volume_resolves_under_mapper() {
        let mut session = LsblkSession::parse(FIXTURE.as_bytes()).unwrap();
        let volumes = session
            .logical_volumes(&PartitionRow { partition_id: "/dev/sdd1".into() })
            .unwrap();
        assert_eq!(
            volumes,
            vec![VolumeRow {
                volume_id: "/dev/mapper/luks-1f2e".into(),
                mount_path: PathBuf::from("/media/user/secure"),
            }]
        );
    }

    #[test]
    fn test_malformed_output() {
        let err = LsblkSession::parse(b"lsblk: unknown column").err().unwrap();
        assert!(matches!(err, UsbSpeedError::Discovery(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_by_id_links() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("sdz");
        fs::write(&target, b"").unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("usb-Acme_Stick_0001-0:0")).unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("usb-Acme_Stick_0001-0:0-part1"))
            .unwrap();
        std::os::unix::fs::symlink(&target, dir.path().join("wwn-0x5000")).unwrap();

        let ids = read_by_id(dir.path());
        assert_eq!(ids.len(), 1);
        let key = fs::canonicalize(&target).unwrap().to_string_lossy().into_owned();
        assert_eq!(ids[&key], "usb-Acme_Stick_0001-0:0");
    }

    #[test]
    fn test_missing_by_id_dir() {
        assert!(read_by_id(Path::new("/nonexistent/by-id")).is_empty());
    }
}
