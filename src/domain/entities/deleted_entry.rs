//! Recoverable-file candidates and their on-disk locations.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::SystemTime;

/// Supported on-disk filesystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilesystemType {
    Ntfs,
    ExFat,
    Fat32,
    /// Unrecognized volume; only signature carving applies.
    Unknown,
}

impl FilesystemType {
    pub fn name(&self) -> &'static str {
        match self {
            FilesystemType::Ntfs => "NTFS",
            FilesystemType::ExFat => "exFAT",
            FilesystemType::Fat32 => "FAT32",
            FilesystemType::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for FilesystemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A contiguous run of logical cluster numbers.
///
/// Invariants: `count > 0`; filesystem-located ranges start at LCN 2 or
/// above. Adjacent ranges are merged after run-list parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterRange {
    pub start_lcn: u64,
    pub count: u64,
}

impl ClusterRange {
    pub fn new(start_lcn: u64, count: u64) -> Self {
        Self { start_lcn, count }
    }

    /// End LCN, exclusive.
    pub fn end_lcn(&self) -> u64 {
        self.start_lcn + self.count
    }
}

/// Merges adjacent ranges in place, preserving order.
///
/// Two ranges touch when `a.start_lcn + a.count == b.start_lcn`.
pub fn merge_adjacent(ranges: &mut Vec<ClusterRange>) {
    if ranges.is_empty() {
        return;
    }
    let mut merged: Vec<ClusterRange> = Vec::with_capacity(ranges.len());
    for range in ranges.drain(..) {
        match merged.last_mut() {
            Some(last) if last.end_lcn() == range.start_lcn => last.count += range.count,
            _ => merged.push(range),
        }
    }
    *ranges = merged;
}

/// Where a candidate's data lives on the source volume.
///
/// Exactly one variant applies per entry. An empty payload means the
/// metadata survived but the data location did not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileLocation {
    /// NTFS resident `$DATA`: the bytes live inside the MFT record itself.
    Resident(Vec<u8>),
    /// NTFS non-resident `$DATA`: decoded and merged data runs.
    Ranges(Vec<ClusterRange>),
    /// exFAT / FAT32 / carved: absolute LCNs, in read order.
    Clusters(Vec<u64>),
}

impl FileLocation {
    /// True when no data position is known (metadata-only entry).
    pub fn is_empty(&self) -> bool {
        match self {
            FileLocation::Resident(bytes) => bytes.is_empty(),
            FileLocation::Ranges(ranges) => ranges.is_empty(),
            FileLocation::Clusters(clusters) => clusters.is_empty(),
        }
    }

    /// Number of clusters covered (0 for resident data).
    pub fn cluster_count(&self) -> u64 {
        match self {
            FileLocation::Resident(_) => 0,
            FileLocation::Ranges(ranges) => ranges.iter().map(|r| r.count).sum(),
            FileLocation::Clusters(clusters) => clusters.len() as u64,
        }
    }
}

impl Default for FileLocation {
    fn default() -> Self {
        FileLocation::Clusters(Vec::new())
    }
}

/// One recoverable (or partially recoverable) deleted-file candidate.
///
/// Ownership: every entry handed to the file-found callback belongs to the
/// callback thereafter; the scanner keeps only the MFT indices it has
/// already reported.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedEntry {
    pub name: String,
    /// Reconstructed virtual path, prefixed `<deleted>\`, `<exFAT>\`,
    /// `<FAT32>\` or `<carved from free space>`.
    pub path: String,
    pub size: u64,
    pub size_formatted: String,
    pub filesystem_type: FilesystemType,
    /// False when the location is lost or the entry is metadata-only.
    pub is_recoverable: bool,
    /// Bytes per cluster on the source volume.
    pub cluster_size: u64,
    pub location: FileLocation,
    pub mft_record: Option<u64>,
    pub deleted_time: Option<SystemTime>,
}

impl DeletedEntry {
    pub fn new(filesystem_type: FilesystemType) -> Self {
        Self {
            name: String::new(),
            path: String::new(),
            size: 0,
            size_formatted: "Unknown".to_string(),
            filesystem_type,
            is_recoverable: false,
            cluster_size: 0,
            location: FileLocation::default(),
            mft_record: None,
            deleted_time: None,
        }
    }

    /// Clusters needed to cover `size` bytes at this entry's cluster size.
    pub fn clusters_needed(&self) -> u64 {
        if self.cluster_size == 0 {
            return 0;
        }
        self.size.div_ceil(self.cluster_size)
    }
}

/// A carver hit: signature match plus the size its header claims.
///
/// The carver never emits hits with `file_size == 0`.
#[derive(Debug, Clone)]
pub struct CarvedHit {
    pub extension: &'static str,
    pub description: &'static str,
    pub start_cluster: u64,
    pub file_size: u64,
}

/// Formats a byte count with decimal SI units (powers of 1000).
pub fn format_file_size(bytes: u64) -> String {
    if bytes >= 1_000_000_000 {
        format!("{:.2} GB", bytes as f64 / 1_000_000_000.0)
    } else if bytes >= 1_000_000 {
        format!("{:.2} MB", bytes as f64 / 1_000_000.0)
    } else if bytes >= 1_000 {
        format!("{:.2} KB", bytes as f64 / 1_000.0)
    } else {
        format!("{} bytes", bytes)
    }
}
