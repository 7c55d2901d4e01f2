//! Repository traits
//!
//! Interfaces between the domain and the platform-specific
//! infrastructure: raw sector access and per-filesystem volume walking.

mod block_device;
mod volume_walker;

pub use block_device::BlockDevice;
pub use volume_walker::{FileFoundCallback, ProgressCallback, ScanFilters, VolumeWalker};
