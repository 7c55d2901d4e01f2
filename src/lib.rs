//! Exhume - deleted-file recovery engine
//!
//! Reads raw block devices sector by sector, bypassing any mounted
//! filesystem driver, and reconstructs deleted files from the residual
//! metadata: NTFS MFT records and the USN change journal, exFAT and
//! FAT32 directory tombstones, and signature carving for everything the
//! metadata no longer covers.

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;

pub use application::{RecoverFilesUseCase, ScanVolumeUseCase};
pub use domain::entities::{
    format_file_size, CarvedHit, ClusterRange, DeletedEntry, FileLocation, FilesystemType,
    ScanConfig, UsnRecord,
};
pub use domain::error::ForensicsError;
pub use domain::repositories::{BlockDevice, ScanFilters, VolumeWalker};
