//! I/O operations module
//!
//! The file-system surface the benchmark runs against: exclusive test-file
//! handles, the scoped test artifact, the transfer buffer and an in-memory
//! volume with simulated transfer rates.

pub mod artifact;
pub mod buffer;
pub mod memory;
pub mod volume;

pub use artifact::TestArtifact;
pub use buffer::TransferBuffer;
pub use memory::MemoryVolumeIo;
pub use volume::{PlatformVolumeIo, TestFile, VolumeIo};
