//! Sequential throughput benchmark
//!
//! Writes a buffer of random bytes to a test file in the volume root a fixed
//! number of times, reads the file back block by block, and converts both
//! phase durations into MB/s. The test file is owned by a [`TestArtifact`]
//! so it is closed and deleted however the run ends.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::BenchmarkConfig;
use crate::io::{PlatformVolumeIo, TestArtifact, TransferBuffer, VolumeIo};
use crate::models::BenchmarkResult;
use crate::util::{format_bytes, format_throughput};
use crate::{Result, UsbSpeedError};

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BenchmarkState {
    Idle,
    WritingFile,
    ReadingFile,
    Cleanup,
    Completed,
    Failed,
}

impl BenchmarkState {
    pub fn description(&self) -> &'static str {
        match self {
            BenchmarkState::Idle => "Idle",
            BenchmarkState::WritingFile => "Writing test file",
            BenchmarkState::ReadingFile => "Reading test file",
            BenchmarkState::Cleanup => "Removing test file",
            BenchmarkState::Completed => "Completed",
            BenchmarkState::Failed => "Failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BenchmarkState::Completed | BenchmarkState::Failed)
    }
}

/// Progress update sent during benchmark execution
#[derive(Debug, Clone)]
pub struct ProgressUpdate {
    pub state: BenchmarkState,
    /// Bytes processed so far in the current phase
    pub bytes_processed: u64,
    /// Bytes the current phase will process
    pub total_bytes: u64,
    /// Elapsed time since the run started
    pub elapsed: Duration,
}

impl ProgressUpdate {
    /// Calculate completion percentage (0.0 to 1.0)
    pub fn completion_percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            0.0
        } else {
            (self.bytes_processed as f64) / (self.total_bytes as f64)
        }
    }
}

struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressUpdate>>,
    started: Instant,
}

impl ProgressReporter {
    fn new(tx: Option<mpsc::Sender<ProgressUpdate>>) -> Self {
        Self {
            tx,
            started: Instant::now(),
        }
    }

    fn update(&self, state: BenchmarkState, bytes_processed: u64, total_bytes: u64) -> ProgressUpdate {
        ProgressUpdate {
            state,
            bytes_processed,
            total_bytes,
            elapsed: self.started.elapsed(),
        }
    }

    /// State changes are always delivered unless the receiver is gone
    async fn transition(&self, state: BenchmarkState, bytes_processed: u64, total_bytes: u64) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(self.update(state, bytes_processed, total_bytes)).await;
        }
    }

    /// Byte progress inside a timed phase; dropped when the channel is full
    fn progress(&self, state: BenchmarkState, bytes_processed: u64, total_bytes: u64) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(self.update(state, bytes_processed, total_bytes));
        }
    }
}

/// Sequential write/read throughput benchmark
pub struct ThroughputBenchmark {
    config: BenchmarkConfig,
    io: Arc<dyn VolumeIo>,
}

impl ThroughputBenchmark {
    /// Benchmark against the real file system
    pub fn new(config: BenchmarkConfig) -> Result<Self> {
        Self::with_io(config, Arc::new(PlatformVolumeIo::new()))
    }

    /// Benchmark against the given volume implementation
    pub fn with_io(config: BenchmarkConfig, io: Arc<dyn VolumeIo>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, io })
    }

    pub fn config(&self) -> &BenchmarkConfig {
        &self.config
    }

    /// Location of the test file for a volume root
    pub fn test_file_path(&self, mount_path: &Path) -> Result<PathBuf> {
        if mount_path.as_os_str().is_empty() {
            return Err(UsbSpeedError::NoDeviceSelected);
        }
        Ok(mount_path.join(&self.config.test_file_name))
    }

    /// Run the benchmark against a mounted volume root
    pub async fn run(&self, mount_path: &Path) -> Result<BenchmarkResult> {
        self.execute(mount_path, ProgressReporter::new(None)).await
    }

    /// Run the benchmark, reporting state changes and byte progress
    pub async fn run_with_progress(
        &self,
        mount_path: &Path,
        progress_tx: mpsc::Sender<ProgressUpdate>,
    ) -> Result<BenchmarkResult> {
        self.execute(mount_path, ProgressReporter::new(Some(progress_tx)))
            .await
    }

    async fn execute(&self, mount_path: &Path, reporter: ProgressReporter) -> Result<BenchmarkResult> {
        let path = match self.test_file_path(mount_path) {
            Ok(path) => path,
            Err(err) => {
                reporter.transition(BenchmarkState::Failed, 0, 0).await;
                return Err(err);
            }
        };

        info!(
            path = %path.display(),
            block_size = %format_bytes(self.config.block_size as u64),
            iterations = self.config.iterations,
            "Starting throughput test"
        );

        let mut artifact = None;
        let outcome = self.run_phases(&path, &mut artifact, &reporter).await;

        reporter.transition(BenchmarkState::Cleanup, 0, 0).await;
        if let Some(artifact) = artifact.take() {
            let cleaned = match &outcome {
                // The handle may be stuck on the device; do not wait on it again
                Err(err) if err.is_timed_out() => artifact.discard(),
                _ => self.release_within_deadline(artifact).await,
            };
            if let Err(err) = cleaned {
                warn!(path = %path.display(), error = %err, "Failed to release test file");
            }
        }

        match &outcome {
            Ok(result) => {
                info!(
                    write = %format_throughput(result.write_speed_mbps),
                    read = %format_throughput(result.read_speed_mbps),
                    write_time = %humantime::format_duration(result.write_elapsed),
                    read_time = %humantime::format_duration(result.read_elapsed),
                    "Throughput test finished"
                );
                reporter.transition(BenchmarkState::Completed, 0, 0).await;
            }
            Err(err) => {
                info!(path = %path.display(), error = %err, "Throughput test failed");
                reporter.transition(BenchmarkState::Failed, 0, 0).await;
            }
        }

        outcome
    }

    async fn run_phases(
        &self,
        path: &Path,
        slot: &mut Option<TestArtifact>,
        reporter: &ProgressReporter,
    ) -> Result<BenchmarkResult> {
        let total = self.config.total_bytes();
        let mut buffer = TransferBuffer::random(self.config.block_size);

        reporter.transition(BenchmarkState::WritingFile, 0, total).await;
        let created = self
            .within_deadline("Creating the test file", async {
                TestArtifact::create(Arc::clone(&self.io), path.to_path_buf())
                    .await
                    .map_err(|e| {
                        UsbSpeedError::io_access(
                            format!("Failed to create test file {}", path.display()),
                            e,
                        )
                    })
            })
            .await?;
        let artifact = slot.insert(created);

        let write_elapsed = self
            .within_deadline("Write phase", self.write_phase(artifact, &buffer, reporter))
            .await?;

        reporter.transition(BenchmarkState::ReadingFile, 0, total).await;
        self.within_deadline("Opening the test file", async {
            artifact.reopen_for_read().await.map_err(|e| {
                UsbSpeedError::io_access(
                    format!("Failed to open test file {} for reading", path.display()),
                    e,
                )
            })
        })
        .await?;

        let read_elapsed = self
            .within_deadline("Read phase", self.read_phase(artifact, &mut buffer, reporter))
            .await?;

        Ok(BenchmarkResult::from_phases(total, write_elapsed, read_elapsed))
    }

    async fn write_phase(
        &self,
        artifact: &mut TestArtifact,
        buffer: &TransferBuffer,
        reporter: &ProgressReporter,
    ) -> Result<Duration> {
        let total = self.config.total_bytes();
        let block = self.config.block_size as u64;
        let context = format!("Failed to write test file {}", artifact.path().display());
        let fail = |e: io::Error| UsbSpeedError::io_access(context.as_str(), e);

        let start = Instant::now();
        let file = artifact.handle().map_err(fail)?;
        for i in 1..=u64::from(self.config.iterations) {
            file.write_block(buffer.as_slice()).await.map_err(fail)?;
            reporter.progress(BenchmarkState::WritingFile, i * block, total);
        }
        file.flush().await.map_err(fail)?;
        if self.config.sync_writes {
            file.sync().await.map_err(fail)?;
        }
        let elapsed = start.elapsed();

        debug!(elapsed = %humantime::format_duration(elapsed), "Write phase done");
        Ok(elapsed)
    }

    async fn read_phase(
        &self,
        artifact: &mut TestArtifact,
        buffer: &mut TransferBuffer,
        reporter: &ProgressReporter,
    ) -> Result<Duration> {
        let total = self.config.total_bytes();
        let block = self.config.block_size as u64;
        let context = format!("Failed to read test file {}", artifact.path().display());
        let fail = |e: io::Error| UsbSpeedError::io_access(context.as_str(), e);

        let mut actual = 0u64;
        let start = Instant::now();
        let file = artifact.handle().map_err(fail)?;
        for i in 1..=u64::from(self.config.iterations) {
            let n = file.read_block(buffer.as_mut_slice()).await.map_err(fail)?;
            actual += n as u64;
            // Counted as a full block whatever the read returned
            reporter.progress(BenchmarkState::ReadingFile, i * block, total);
        }
        let elapsed = start.elapsed();

        if actual != total {
            debug!(expected = total, actual, "Short reads during read phase");
        }
        debug!(elapsed = %humantime::format_duration(elapsed), "Read phase done");
        Ok(elapsed)
    }

    async fn release_within_deadline(&self, artifact: TestArtifact) -> io::Result<()> {
        let Some(limit) = self.config.phase_timeout else {
            return artifact.release().await;
        };

        // On expiry the artifact is dropped mid-close and deletes the file itself
        tokio::time::timeout(limit, artifact.release())
            .await
            .unwrap_or_else(|_| {
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "closing the test file timed out",
                ))
            })
    }

    async fn within_deadline<T, F>(&self, step: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let Some(limit) = self.config.phase_timeout else {
            return fut.await;
        };

        match tokio::time::timeout(limit, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(UsbSpeedError::io_access(
                format!(
                    "{} did not finish within {}",
                    step,
                    humantime::format_duration(limit)
                ),
                io::Error::new(io::ErrorKind::TimedOut, "operation timed out"),
            )),
        }
    }
}

/// Measure write and read throughput of a mounted volume with the default
/// 1 MiB x 10 configuration
pub async fn measure_throughput(mount_path: impl AsRef<Path>) -> Result<BenchmarkResult> {
    ThroughputBenchmark::new(BenchmarkConfig::default())?
        .run(mount_path.as_ref())
        .await
}
