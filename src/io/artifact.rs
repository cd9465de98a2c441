use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::volume::{TestFile, VolumeIo};

/// Scoped ownership of the benchmark's test file.
///
/// Exists only once this run holds the file exclusively. The open handle is
/// closed before the file is deleted, either by [`TestArtifact::release`] or,
/// if the run panics or its future is dropped, by `Drop`. A handle stuck on
/// the device can be abandoned with [`TestArtifact::discard`].
pub struct TestArtifact {
    io: Arc<dyn VolumeIo>,
    path: PathBuf,
    handle: Option<Box<dyn TestFile>>,
    armed: bool,
}

impl TestArtifact {
    /// Create or take over the file with exclusive write access
    pub async fn create(io: Arc<dyn VolumeIo>, path: PathBuf) -> io::Result<Self> {
        let handle = io.create_exclusive(&path).await?;
        Ok(Self {
            io,
            path,
            handle: Some(handle),
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The currently open handle
    pub fn handle(&mut self) -> io::Result<&mut dyn TestFile> {
        match self.handle.as_deref_mut() {
            Some(handle) => Ok(handle),
            None => Err(io::Error::new(
                io::ErrorKind::Other,
                "test file is not open",
            )),
        }
    }

    /// Close the open handle, if any
    pub async fn close(&mut self) -> io::Result<()> {
        if let Some(mut handle) = self.handle.take() {
            handle.close().await?;
        }
        Ok(())
    }

    /// Close the write handle and reopen the file for exclusive reading
    pub async fn reopen_for_read(&mut self) -> io::Result<()> {
        self.close().await?;
        self.handle = Some(self.io.open_exclusive_read(&self.path).await?);
        Ok(())
    }

    /// Close and delete the file. Deletion is attempted even if closing failed.
    ///
    /// If this future is dropped while closing, `Drop` still deletes the file.
    pub async fn release(mut self) -> io::Result<()> {
        let closed = self.close().await;
        self.armed = false;
        let removed = self.io.remove(&self.path);
        closed.and(removed)
    }

    /// Drop the handle without waiting on in-flight I/O and delete the file
    pub fn discard(mut self) -> io::Result<()> {
        self.armed = false;
        self.handle.take();
        self.io.remove(&self.path)
    }
}

impl Drop for TestArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.handle.take();
        match self.io.remove(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed abandoned test file"),
            Err(err) => warn!(
                path = %self.path.display(),
                error = %err,
                "Failed to remove abandoned test file"
            ),
        }
    }
}
