//! Hard limits and corruption guards applied during a scan.

use serde::{Deserialize, Serialize};

/// Tunable scan limits. Defaults match the reference behavior; there is
/// no on-disk persistence (`load` returns the defaults and `save` is a
/// no-op for front-ends that expect the calls to exist).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Upper bound on MFT record indices walked in Stage 1.
    pub ntfs_mft_record_limit: u64,
    /// Maximum USN records decoded from `$J`.
    pub usn_record_limit: u64,
    /// Cap on clusters read while pulling the `$J` stream.
    pub usn_cluster_read_limit: u64,
    /// Clusters to carve in Stage 3; 0 means the whole disk.
    pub carving_cluster_limit: u64,
    /// Stop carving after this many hits.
    pub carving_max_files: u64,
    /// Directory-queue guard for the FAT-family breadth-first walks.
    pub directory_limit: u64,
    /// Byte cap per directory cluster chain (exFAT and FAT32).
    pub directory_read_limit: u64,
    /// Contiguous-chain guard for FAT32 directory reads, in clusters.
    pub fat32_chain_limit: u32,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            ntfs_mft_record_limit: 1_000_000,
            usn_record_limit: 100_000,
            usn_cluster_read_limit: 100_000,
            carving_cluster_limit: 0,
            carving_max_files: 10_000,
            directory_limit: 100_000,
            directory_read_limit: 2 * 1024 * 1024,
            fat32_chain_limit: 2_048,
        }
    }
}

impl ScanConfig {
    /// Loads the configuration. Nothing is persisted; the defaults are
    /// hard-coded.
    pub fn load() -> Self {
        Self::default()
    }

    /// Persists the configuration. No-op.
    pub fn save(&self) -> bool {
        true
    }
}
