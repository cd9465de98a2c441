use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// File-system operations the benchmark needs on the target volume
#[async_trait]
pub trait VolumeIo: Send + Sync {
    /// Create or take over a file for exclusive write access, truncating it.
    ///
    /// Fails with `WouldBlock` while another handle holds the file.
    async fn create_exclusive(&self, path: &Path) -> io::Result<Box<dyn TestFile>>;

    /// Open an existing file for exclusive read access
    async fn open_exclusive_read(&self, path: &Path) -> io::Result<Box<dyn TestFile>>;

    /// Delete a file. A file that is already gone counts as deleted.
    ///
    /// Called from `Drop`, so implementations must not need a runtime.
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Handle to the test file
#[async_trait]
pub trait TestFile: Send {
    /// Write the whole buffer
    async fn write_block(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Read up to `buf.len()` bytes, returning how many were read
    async fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Push buffered data to the OS
    async fn flush(&mut self) -> io::Result<()>;

    /// Force data to the device
    async fn sync(&mut self) -> io::Result<()>;

    /// Release the handle after in-flight operations complete
    async fn close(&mut self) -> io::Result<()>;
}

/// Test-file access on the real file system
#[derive(Clone, Default)]
pub struct PlatformVolumeIo;

impl PlatformVolumeIo {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VolumeIo for PlatformVolumeIo {
    async fn create_exclusive(&self, path: &Path) -> io::Result<Box<dyn TestFile>> {
        let file = open_in_background(path, OpenMode::Write).await?;
        Ok(Box::new(PlatformTestFile::new(file)))
    }

    async fn open_exclusive_read(&self, path: &Path) -> io::Result<Box<dyn TestFile>> {
        let file = open_in_background(path, OpenMode::Read).await?;
        Ok(Box::new(PlatformTestFile::new(file)))
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match std::fs::remove_file(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenMode {
    Write,
    Read,
}

#[derive(Default)]
struct PendingOpen {
    abandoned: bool,
    file: Option<std::fs::File>,
}

fn lock_pending(pending: &Mutex<PendingOpen>) -> io::Result<MutexGuard<'_, PendingOpen>> {
    pending
        .lock()
        .map_err(|_| io::Error::new(io::ErrorKind::Other, "pending open lock poisoned"))
}

/// Deletes a file opened for writing whose caller stopped waiting for it
struct AbandonGuard {
    pending: Arc<Mutex<PendingOpen>>,
    path: PathBuf,
    mode: OpenMode,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut pending) = self.pending.lock() {
            pending.abandoned = true;
            if pending.file.take().is_some() && self.mode == OpenMode::Write {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }
}

/// Open on the blocking pool. If the returned future is dropped before the
/// open finishes, the file is closed (and, for writes, deleted) as soon as
/// the blocking open returns.
async fn open_in_background(path: &Path, mode: OpenMode) -> io::Result<File> {
    let pending = Arc::new(Mutex::new(PendingOpen::default()));
    let mut guard = AbandonGuard {
        pending: Arc::clone(&pending),
        path: path.to_path_buf(),
        mode,
        armed: true,
    };

    let task_pending = Arc::clone(&pending);
    let task_path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let file = open_locked(&task_path, mode)?;
        let mut pending = lock_pending(&task_pending)?;
        if pending.abandoned {
            drop(file);
            if mode == OpenMode::Write {
                let _ = std::fs::remove_file(&task_path);
            }
            return Err(io::Error::new(io::ErrorKind::Interrupted, "open abandoned"));
        }
        pending.file = Some(file);
        Ok(())
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

    let file = lock_pending(&pending)?.file.take();
    guard.armed = false;
    file.map(File::from_std)
        .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "opened file went missing"))
}

#[cfg(windows)]
fn open_locked(path: &Path, mode: OpenMode) -> io::Result<std::fs::File> {
    use std::os::windows::fs::OpenOptionsExt;

    const ERROR_SHARING_VIOLATION: i32 = 32;
    const ERROR_LOCK_VIOLATION: i32 = 33;

    let mut options = std::fs::OpenOptions::new();
    match mode {
        OpenMode::Write => options.write(true).create(true).truncate(true),
        OpenMode::Read => options.read(true),
    };
    // No FILE_SHARE_* flags: any other handle to the file is refused
    options.share_mode(0);

    match options.open(path) {
        Err(err)
            if matches!(
                err.raw_os_error(),
                Some(ERROR_SHARING_VIOLATION) | Some(ERROR_LOCK_VIOLATION)
            ) =>
        {
            Err(io::Error::new(io::ErrorKind::WouldBlock, err))
        }
        other => other,
    }
}

#[cfg(unix)]
fn open_locked(path: &Path, mode: OpenMode) -> io::Result<std::fs::File> {
    use std::os::unix::io::AsRawFd;

    let mut options = std::fs::OpenOptions::new();
    match mode {
        // Truncated only once the lock is held
        OpenMode::Write => options.write(true).create(true).truncate(false),
        OpenMode::Read => options.read(true),
    };
    let file = options.open(path)?;

    // SAFETY: the descriptor is owned by `file` and stays open for the call
    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::WouldBlock {
            return Err(err);
        }
        // Some FUSE and network file systems refuse flock outright
        tracing::debug!(path = %path.display(), error = %err, "flock unsupported, continuing unlocked");
    }

    if mode == OpenMode::Write {
        file.set_len(0)?;
    }
    Ok(file)
}

#[cfg(not(any(unix, windows)))]
fn open_locked(path: &Path, mode: OpenMode) -> io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    match mode {
        OpenMode::Write => options.write(true).create(true).truncate(true),
        OpenMode::Read => options.read(true),
    };
    options.open(path)
}

struct PlatformTestFile {
    file: Option<File>,
}

impl PlatformTestFile {
    fn new(file: File) -> Self {
        Self { file: Some(file) }
    }

    fn handle(&mut self) -> io::Result<&mut File> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "test file handle already closed"))
    }
}

#[async_trait]
impl TestFile for PlatformTestFile {
    async fn write_block(&mut self, buf: &[u8]) -> io::Result<()> {
        self.handle()?.write_all(buf).await
    }

    async fn read_block(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle()?.read(buf).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.handle()?.flush().await
    }

    async fn sync(&mut self) -> io::Result<()> {
        self.handle()?.sync_all().await
    }

    async fn close(&mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            // Surfaces errors from a write still in flight
            file.flush().await?;
            drop(file.into_std().await);
        }
        Ok(())
    }
}
