//! Block device implementations
//!
//! `FileBlockDevice` covers disk-image files and POSIX raw devices;
//! `RawVolumeDevice` opens `\\.\X:` drive-letter volumes on Windows.

mod file_device;
#[cfg(windows)]
mod raw_volume;

pub use file_device::FileBlockDevice;
#[cfg(windows)]
pub use raw_volume::RawVolumeDevice;

/// Upper bound on a single zero-copy mapping.
pub const MAX_MAPPING_SIZE: u64 = 256 * 1024 * 1024;

/// Mapping offsets are aligned down to this granularity (the Windows
/// allocation granularity; a multiple of every supported page size).
pub const MAPPING_GRANULARITY: u64 = 64 * 1024;
