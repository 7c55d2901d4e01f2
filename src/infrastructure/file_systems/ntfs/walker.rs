//! MFT volume walk and virtual-path reconstruction.

use super::boot::NtfsBootSector;
use super::record::{
    apply_fixups, parent_reference, parse_mft_record, read_mft_record, ParsedRecord,
};
use crate::domain::entities::{format_file_size, DeletedEntry, FileLocation, FilesystemType, ScanConfig};
use crate::domain::error::Result;
use crate::domain::repositories::{
    BlockDevice, FileFoundCallback, ProgressCallback, ScanFilters, VolumeWalker,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Records fetched per batch read.
const RECORDS_PER_BATCH: u64 = 1024;

/// Hard ceiling on parent-chain depth during path reconstruction.
const MAX_PATH_DEPTH: usize = 50;

/// NTFS root directory MFT index.
const ROOT_MFT_INDEX: u64 = 5;

/// Walks the MFT for deleted file records.
///
/// The path cache lives for one scan; `scan_volume` clears it on entry.
pub struct NtfsWalker {
    path_cache: HashMap<u64, String>,
}

impl NtfsWalker {
    pub fn new() -> Self {
        Self {
            path_cache: HashMap::new(),
        }
    }

    pub fn read_boot_sector(&self, device: &dyn BlockDevice) -> Result<NtfsBootSector> {
        let data = device.read_sectors(0, 1, device.sector_size());
        NtfsBootSector::parse(&data)
    }

    /// Builds a `DeletedEntry` from a fixed-up record, reconstructing the
    /// virtual path. Returns `None` for records that are not deleted
    /// files.
    pub fn build_entry(
        &mut self,
        device: &dyn BlockDevice,
        boot: &NtfsBootSector,
        record: &[u8],
        record_num: u64,
    ) -> Option<DeletedEntry> {
        let parsed = parse_mft_record(record, boot)?;
        self.entry_from_parsed(device, boot, record, record_num, parsed)
    }

    /// `build_entry` for USN-confirmed deletions: the journal already
    /// proved the file deleted, so the in-use bit is not consulted.
    pub fn build_entry_unchecked(
        &mut self,
        device: &dyn BlockDevice,
        boot: &NtfsBootSector,
        record: &[u8],
        record_num: u64,
    ) -> Option<DeletedEntry> {
        let parsed = super::record::parse_mft_record_unchecked(record, boot)?;
        self.entry_from_parsed(device, boot, record, record_num, parsed)
    }

    fn entry_from_parsed(
        &mut self,
        device: &dyn BlockDevice,
        boot: &NtfsBootSector,
        record: &[u8],
        record_num: u64,
        parsed: ParsedRecord,
    ) -> Option<DeletedEntry> {
        let mut entry = DeletedEntry::new(FilesystemType::Ntfs);
        entry.mft_record = Some(record_num);
        entry.cluster_size = boot.bytes_per_cluster();
        self.apply_data(&mut entry, &parsed);
        entry.name = parsed.name;

        let parent = parent_reference(record).filter(|&p| p != record_num);
        let dir = match parent {
            Some(parent_idx) => {
                let mut visited = HashSet::new();
                self.resolve_directory(device, boot, parent_idx, &mut visited)
            }
            None => "<deleted>".to_string(),
        };
        entry.path = format!("{}\\{}", dir, entry.name);
        Some(entry)
    }

    fn apply_data(&self, entry: &mut DeletedEntry, parsed: &ParsedRecord) {
        if !parsed.has_data {
            return;
        }
        entry.size = parsed.size;
        entry.size_formatted = format_file_size(parsed.size);
        entry.is_recoverable = match &parsed.location {
            FileLocation::Resident(_) => true,
            FileLocation::Ranges(ranges) => !ranges.is_empty(),
            FileLocation::Clusters(clusters) => !clusters.is_empty(),
        };
        entry.location = parsed.location.clone();
    }

    /// Resolves the virtual path of a directory by climbing parent
    /// references.
    ///
    /// The visited set is per call chain and, with the depth cap, breaks
    /// cycles on damaged media. Anything unresolvable collapses to
    /// `<deleted>`.
    fn resolve_directory(
        &mut self,
        device: &dyn BlockDevice,
        boot: &NtfsBootSector,
        index: u64,
        visited: &mut HashSet<u64>,
    ) -> String {
        if index == 0 || index == ROOT_MFT_INDEX {
            return "<deleted>".to_string();
        }
        if let Some(cached) = self.path_cache.get(&index) {
            return cached.clone();
        }
        if visited.len() >= MAX_PATH_DEPTH || !visited.insert(index) {
            debug!(index, "path reconstruction cycle or depth limit");
            return "<deleted>".to_string();
        }

        let record = read_mft_record(device, boot, index);
        let resolved = match super::record::best_file_name(&record) {
            Some(name) => {
                let parent = parent_reference(&record).filter(|&p| p != index);
                let parent_path = match parent {
                    Some(parent_idx) => self.resolve_directory(device, boot, parent_idx, visited),
                    None => "<deleted>".to_string(),
                };
                format!("{}\\{}", parent_path, name)
            }
            None => "<deleted>".to_string(),
        };

        visited.remove(&index);
        self.path_cache.insert(index, resolved.clone());
        resolved
    }
}

impl Default for NtfsWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeWalker for NtfsWalker {
    fn scan_volume(
        &mut self,
        device: &dyn BlockDevice,
        filters: &ScanFilters,
        on_file_found: &mut FileFoundCallback,
        on_progress: &mut ProgressCallback,
        cancel: &AtomicBool,
        config: &ScanConfig,
    ) -> Result<bool> {
        self.path_cache.clear();

        let boot = self.read_boot_sector(device)?;
        let sector_size = boot.bytes_per_sector as u64;
        let record_size = boot.mft_record_size();
        let max_records = config.ntfs_mft_record_limit;
        let sectors_per_batch = (RECORDS_PER_BATCH * record_size).div_ceil(sector_size);

        let mut records_scanned: u64 = 0;
        let mut files_found: u64 = 0;

        let mut batch_start: u64 = 0;
        while batch_start < max_records {
            if cancel.load(Ordering::Acquire) {
                return Ok(false);
            }

            let batch_offset = boot.mft_offset() + batch_start * record_size;
            let start_sector = batch_offset / sector_size;
            let batch = device.read_sectors(start_sector, sectors_per_batch, sector_size);
            if batch.is_empty() {
                if batch_start == 0 {
                    on_progress("Failed to read MFT data from disk", 0.0);
                    return Ok(false);
                }
                records_scanned += RECORDS_PER_BATCH;
                batch_start += RECORDS_PER_BATCH;
                continue;
            }

            for j in 0..RECORDS_PER_BATCH {
                let record_num = batch_start + j;
                if record_num >= max_records {
                    break;
                }
                if j % 10 == 0 && cancel.load(Ordering::Acquire) {
                    return Ok(false);
                }

                let offset = (j * record_size) as usize;
                let end = offset + record_size as usize;
                if end > batch.len() {
                    break;
                }

                let mut record = batch[offset..end].to_vec();
                apply_fixups(&mut record, boot.bytes_per_sector);

                if let Some(entry) = self.build_entry(device, &boot, &record, record_num) {
                    if filters.matches(&entry.path, &entry.name) {
                        files_found += 1;
                        on_file_found(entry);
                    }
                }
                records_scanned += 1;
            }

            if batch_start % 10_240 == 0 {
                let fraction = batch_start as f32 / max_records as f32;
                on_progress(
                    &format!(
                        "MFT: scanned {} records, found {} deleted files",
                        batch_start, files_found
                    ),
                    fraction,
                );
            }
            batch_start += RECORDS_PER_BATCH;
        }

        on_progress(
            &format!(
                "MFT scan complete: {} records scanned, {} deleted files found",
                records_scanned, files_found
            ),
            1.0,
        );
        Ok(true)
    }
}
