//! In-memory volume with simulated transfer rates
//!
//! Stands in for a mounted device when the timing behaviour of the
//! benchmark needs to be checked without real hardware. Exclusive access is
//! emulated: opening a file that has a live handle fails with `WouldBlock`,
//! and creating over an idle file truncates it.

use async_trait::async_trait;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::volume::{TestFile, VolumeIo};

const MIB: f64 = 1_048_576.0;

#[derive(Default)]
struct FileEntry {
    data: Vec<u8>,
    open: bool,
}

type FileTable = Arc<Mutex<HashMap<PathBuf, FileEntry>>>;

fn lock(files: &FileTable) -> io::Result<MutexGuard<'_, HashMap<PathBuf, FileEntry>>> {
    files
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "memory volume lock poisoned"))
}

/// Simulated volume
#[derive(Clone, Default)]
pub struct MemoryVolumeIo {
    files: FileTable,
    write_rate_mbps: Option<f64>,
    read_rate_mbps: Option<f64>,
    fail_writes_after: Option<usize>,
}

impl MemoryVolumeIo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each write takes as long as the given rate (MiB/s) implies
    pub fn with_write_rate(mut self, mbps: f64) -> Self {
        self.write_rate_mbps = Some(mbps);
        self
    }

    /// Each read takes as long as the given rate (MiB/s) implies
    pub fn with_read_rate(mut self, mbps: f64) -> Self {
        self.read_rate_mbps = Some(mbps);
        self
    }

    /// Writes after the first `count` on a handle fail as if the volume filled up
    pub fn failing_writes_after(mut self, count: usize) -> Self {
        self.fail_writes_after = Some(count);
        self
    }

    pub fn exists(&self, path: &Path) -> bool {
        lock(&self.files)
            .map(|files| files.contains_key(path))
            .unwrap_or(false)
    }

    /// Size of a stored file
    pub fn file_len(&self, path: &Path) -> Option<usize> {
        lock(&self.files).ok()?.get(path).map(|entry| entry.data.len())
    }

    fn open_handle(&self, path: &Path) -> MemoryTestFile {
        MemoryTestFile {
            files: Arc::clone(&self.files),
            path: path.to_path_buf(),
            position: 0,
            write_rate_mbps: self.write_rate_mbps,
            read_rate_mbps: self.read_rate_mbps,
            writes_left: self.fail_writes_after,
            closed: false,
        }
    }
}

#[async_trait]
impl VolumeIo for MemoryVolumeIo {
    async fn create_exclusive(&self, path: &Path) -> io::Result<Box<dyn TestFile>> {
        let mut files = lock(&self.files)?;
        if files.get(path).is_some_and(|entry| entry.open) {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("{} is locked by another handle", path.display()),
            ));
        }
        files.insert(
            path.to_path_buf(),
            FileEntry {
                data: Vec::new(),
                open: true,
            },
        );
        Ok(Box::new(self.open_handle(path)))
    }

    async fn open_exclusive_read(&self, path: &Path) -> io::Result<Box<dyn TestFile>> {
        let mut files = lock(&self.files)?;
        let entry = files.get_mut(path).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("{} not found", path.display()),
            )
        })?;
        if entry.open {
            return Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                format!("{} is locked by another handle", path.display()),
            ));
        }
        entry.open = true;
        Ok(Box::new(self.open_handle(path)))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        lock(&self.files)?.remove(path);
        Ok(())
    }
}

struct MemoryTestFile {
    files: FileTable,
    path: PathBuf,
    position: usize,
    write_rate_mbps: Option<f64>,
    read_rate_mbps: Option<f64>,
    writes_left: Option<usize>,
    closed: bool,
}

impl MemoryTestFile {
    fn ensure_open(&self) -> io::Result<()> {
        if self.closed {
            return Err(io::Error::new(io::ErrorKind::Other, "handle closed"));
        }
        Ok(())
    }

    fn release(&mut self) {
        self.closed = true;
        if let Ok(mut files) = lock(&self.files) {
            if let Some(entry) = files.get_mut(&self.path) {
                entry.open = false;
            }
        }
    }
}

async fn simulate_transfer(bytes: usize, rate_mbps: Option<f64>) {
    if let Some(rate) = rate_mbps.filter(|r| *r > 0.0) {
        tokio::time::sleep(Duration::from_secs_f64(bytes as f64 / MIB / rate)).await;
    }
}

#[async_trait]
impl TestFile for MemoryTestFile {
    async fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        self.ensure_open()?;
        if let Some(left) = self.writes_left.as_mut() {
            if *left == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    "No space left on device",
                ));
            }
            *left -= 1;
        }

        simulate_transfer(buf.len(), self.write_rate_mbps).await;

        let mut files = lock(&self.files)?;
        let entry = files
            .get_mut(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file was removed"))?;
        entry.data.extend_from_slice(buf);
        Ok(())
    }

    async fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        simulate_transfer(buf.len(), self.read_rate_mbps).await;

        let files = lock(&self.files)?;
        let entry = files
            .get(&self.path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "file was removed"))?;
        let available = entry.data.len().saturating_sub(self.position);
        let n = available.min(buf.len());
        buf[..n].copy_from_slice(&entry.data[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.ensure_open()
    }

    async fn sync(&mut self) -> io::Result<()> {
        self.ensure_open()
    }

    async fn close(&mut self) -> io::Result<()> {
        if !self.closed {
            self.release();
        }
        Ok(())
    }
}

impl Drop for MemoryTestFile {
    fn drop(&mut self) {
        if !self.closed {
            self.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_simulated_write_rate() {
        let volume = MemoryVolumeIo::new().with_write_rate(50.0);
        let path = Path::new("/mnt/usb/testfile.dat");
        let mut file = volume.create_exclusive(path).await.unwrap();

        let start = Instant::now();
        file.write_block(&vec![0u8; 1024 * 1024]).await.unwrap();
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(20) && elapsed < Duration::from_millis(22));
        assert_eq!(volume.file_len(path), Some(1024 * 1024));
    }

    #[tokio::test]
    async fn test_exclusive_open_emulation() {
        let volume = MemoryVolumeIo::new();
        let path = Path::new("/mnt/usb/testfile.dat");
        let mut writer = volume.create_exclusive(path).await.unwrap();

        let err = volume.open_exclusive_read(path).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        writer.close().await.unwrap();
        let _reader = volume.open_exclusive_read(path).await.unwrap();
        let err = volume.open_exclusive_read(path).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[tokio::test]
    async fn test_create_takes_over_idle_file() {
        let volume = MemoryVolumeIo::new();
        let path = Path::new("/mnt/usb/testfile.dat");
        let mut stale = volume.create_exclusive(path).await.unwrap();
        stale.write_block(&[9; 32]).await.unwrap();
        stale.close().await.unwrap();

        let _fresh = volume.create_exclusive(path).await.unwrap();
        assert_eq!(volume.file_len(path), Some(0));
        let err = volume.create_exclusive(path).await.err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }

    #[tokio::test]
    async fn test_dropped_handle_releases_lock() {
        let volume = MemoryVolumeIo::new();
        let path = Path::new("/mnt/usb/testfile.dat");
        drop(volume.create_exclusive(path).await.unwrap());
        assert!(volume.open_exclusive_read(path).await.is_ok());
    }

    #[tokio::test]
    async fn test_write_fault_injection() {
        let volume = MemoryVolumeIo::new().failing_writes_after(1);
        let path = Path::new("/mnt/usb/testfile.dat");
        let mut file = volume.create_exclusive(path).await.unwrap();

        file.write_block(&[1; 8]).await.unwrap();
        let err = file.write_block(&[1; 8]).await.unwrap_err();
        assert!(err.to_string().contains("No space left"));
    }
}
