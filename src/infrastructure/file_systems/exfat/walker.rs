//! Breadth-first exFAT directory traversal.

use super::boot::ExFatBootSector;
use crate::domain::entities::{format_file_size, DeletedEntry, FileLocation, FilesystemType, ScanConfig};
use crate::domain::error::Result;
use crate::domain::repositories::{
    BlockDevice, FileFoundCallback, ProgressCallback, ScanFilters, VolumeWalker,
};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Entry-type bits: the kind lives in the low 7 bits, the in-use flag in
/// bit 7 (cleared = deleted).
const TYPE_FILE: u8 = 0x05;
const TYPE_STREAM: u8 = 0x40;
const TYPE_NAME: u8 = 0x41;

const ATTR_DIRECTORY: u16 = 0x10;

/// Chain guard while following the FAT for active directories.
const MAX_DIRECTORY_CHAIN: usize = 1024;

/// Reconstruction cap for deleted files assumed contiguous.
const MAX_DELETED_SEQUENTIAL_SIZE: u64 = 10 * 1024 * 1024 * 1024;

struct DirectoryWorkItem {
    first_cluster: u32,
    path: String,
}

pub struct ExFatWalker;

impl ExFatWalker {
    pub fn new() -> Self {
        Self
    }

    /// Reads an active directory's cluster chain via the FAT, stopping at
    /// the end-of-directory marker or the byte cap.
    fn read_directory_chain(
        &self,
        device: &dyn BlockDevice,
        boot: &ExFatBootSector,
        start_cluster: u32,
        cancel: &AtomicBool,
        limit_bytes: u64,
    ) -> Vec<u8> {
        if start_cluster < 2 {
            return Vec::new();
        }

        let mut buffer = Vec::new();
        for cluster in self.follow_fat_chain(device, boot, start_cluster, MAX_DIRECTORY_CHAIN) {
            if cancel.load(Ordering::Acquire) {
                break;
            }

            let sector = boot.cluster_heap_offset as u64
                + (cluster as u64 - 2) * boot.sectors_per_cluster();
            let data = device.read_sectors(sector, boot.sectors_per_cluster(), boot.sector_size());
            if data.is_empty() {
                break;
            }

            let old_len = buffer.len();
            buffer.extend_from_slice(&data);

            let end_seen = buffer[old_len..]
                .chunks(32)
                .any(|entry| entry.first() == Some(&0x00));
            if end_seen {
                break;
            }
            if limit_bytes > 0 && buffer.len() as u64 >= limit_bytes {
                break;
            }
        }
        buffer
    }

    /// Follows 32-bit FAT entries from `start_cluster`. End-of-chain is
    /// any value >= 0xFFFF_FFF8; valid next clusters are 2..=0xFFFF_FFF6.
    fn follow_fat_chain(
        &self,
        device: &dyn BlockDevice,
        boot: &ExFatBootSector,
        start_cluster: u32,
        max_clusters: usize,
    ) -> Vec<u32> {
        let mut clusters = vec![start_cluster];
        let mut current = start_cluster;

        while clusters.len() < max_clusters {
            match self.read_fat_entry(device, boot, current) {
                Some(next) => {
                    clusters.push(next);
                    current = next;
                }
                None => break,
            }
        }
        clusters
    }

    fn read_fat_entry(
        &self,
        device: &dyn BlockDevice,
        boot: &ExFatBootSector,
        cluster: u32,
    ) -> Option<u32> {
        let sector_size = boot.sector_size();
        let fat_entry_offset = cluster as u64 * 4;
        let fat_sector = boot.fat_offset as u64 + fat_entry_offset / sector_size;
        let offset_in_sector = (fat_entry_offset % sector_size) as usize;

        let data = device.read_sectors(fat_sector, 1, sector_size);
        if data.len() < offset_in_sector + 4 {
            return None;
        }

        let entry = LittleEndian::read_u32(&data[offset_in_sector..offset_in_sector + 4]);
        (entry >= 2 && entry <= 0xFFFF_FFF6).then_some(entry)
    }

    /// Decodes one file/stream/name entry set starting at `start`.
    /// Returns the deleted-file entry (if any), the subdirectory to queue
    /// (if any), and the index just past the consumed set.
    fn decode_entry_set(
        &self,
        boot: &ExFatBootSector,
        dir_data: &[u8],
        start: usize,
        dir_path: &str,
    ) -> (Option<DeletedEntry>, Option<DirectoryWorkItem>, usize) {
        let entry = &dir_data[start..start + 32];
        let deleted = entry[0] & 0x80 == 0;
        let secondary_count = entry[1] as usize;
        let attributes = LittleEndian::read_u16(&entry[4..6]);
        let is_dir = attributes & ATTR_DIRECTORY != 0;

        // The whole set, stream entry included, must fit the buffer.
        if secondary_count == 0 || start + 32 + secondary_count * 32 > dir_data.len() {
            return (None, None, dir_data.len());
        }

        let mut i = start + 32;
        let stream = &dir_data[i..i + 32];
        if stream[0] & 0x7F != TYPE_STREAM {
            return (None, None, i);
        }
        let name_length = stream[3] as usize;
        let first_cluster = LittleEndian::read_u32(&stream[20..24]);
        let data_length = LittleEndian::read_u64(&stream[24..32]);

        let mut name_units: Vec<u16> = Vec::with_capacity(name_length);
        let mut remaining = secondary_count.saturating_sub(1);
        i += 32;
        while remaining > 0 && i + 32 <= dir_data.len() {
            let name_entry = &dir_data[i..i + 32];
            if name_entry[0] & 0x7F == TYPE_NAME {
                for k in 0..15 {
                    if name_units.len() >= name_length {
                        break;
                    }
                    name_units.push(LittleEndian::read_u16(&name_entry[2 + k * 2..4 + k * 2]));
                }
            }
            i += 32;
            remaining -= 1;
        }
        let name = String::from_utf16_lossy(&name_units);

        let full_path = if dir_path.is_empty() {
            name.clone()
        } else {
            format!("{}\\{}", dir_path, name)
        };

        let subdir = (is_dir && first_cluster >= 2).then(|| DirectoryWorkItem {
            first_cluster,
            path: full_path.clone(),
        });

        if is_dir || !deleted {
            return (None, subdir, i);
        }

        let mut file = DeletedEntry::new(FilesystemType::ExFat);
        file.name = name;
        file.path = format!("<exFAT>\\{}", full_path);
        file.size = data_length;
        file.size_formatted = format_file_size(data_length);
        file.is_recoverable = true;
        file.cluster_size = boot.cluster_size();

        // The FAT entries of a deleted file are zeroed, so the chain
        // cannot be followed; assume contiguous allocation from the
        // first cluster.
        if first_cluster >= 2 && data_length > 0 {
            let cluster_size = boot.cluster_size();
            let clusters_needed = data_length.div_ceil(cluster_size);
            let max_clusters = MAX_DELETED_SEQUENTIAL_SIZE / cluster_size;
            let clusters_to_add = clusters_needed.min(max_clusters);

            let heap_base = boot.heap_cluster_base();
            let clusters: Vec<u64> = (0..clusters_to_add)
                .map(|idx| heap_base + (first_cluster as u64 - 2) + idx)
                .collect();
            file.location = FileLocation::Clusters(clusters);

            if clusters_needed > clusters_to_add {
                file.is_recoverable = false;
                file.size_formatted = "Partial (size limit)".to_string();
            }
        }

        (Some(file), subdir, i)
    }
}

impl Default for ExFatWalker {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeWalker for ExFatWalker {
    fn scan_volume(
        &mut self,
        device: &dyn BlockDevice,
        filters: &ScanFilters,
        on_file_found: &mut FileFoundCallback,
        on_progress: &mut ProgressCallback,
        cancel: &AtomicBool,
        config: &ScanConfig,
    ) -> Result<bool> {
        on_progress("Reading exFAT boot sector...", 0.0);

        let boot_data = device.read_sectors(0, 1, device.sector_size());
        let boot = ExFatBootSector::parse(&boot_data)?;

        on_progress(
            &format!(
                "exFAT: root={}, FAT at sector {} ({:.2} MB). Scanning...",
                boot.root_directory_cluster,
                boot.fat_offset,
                (boot.fat_offset as u64 * boot.sector_size()) as f64 / (1024.0 * 1024.0)
            ),
            0.0,
        );

        let mut queue: VecDeque<DirectoryWorkItem> = VecDeque::new();
        queue.push_back(DirectoryWorkItem {
            first_cluster: boot.root_directory_cluster,
            path: String::new(),
        });

        let mut directories_scanned: u64 = 0;
        let mut files_found: u64 = 0;

        while let Some(dir) = queue.pop_front() {
            if cancel.load(Ordering::Acquire) {
                return Ok(false);
            }

            let dir_data = self.read_directory_chain(
                device,
                &boot,
                dir.first_cluster,
                cancel,
                config.directory_read_limit,
            );

            let mut i = 0;
            while i + 32 <= dir_data.len() {
                if cancel.load(Ordering::Acquire) {
                    return Ok(false);
                }

                let entry_type = dir_data[i];
                if entry_type == 0x00 {
                    break;
                }
                if entry_type & 0x7F != TYPE_FILE {
                    i += 32;
                    continue;
                }

                let (file, subdir, next) = self.decode_entry_set(&boot, &dir_data, i, &dir.path);
                if let Some(item) = subdir {
                    queue.push_back(item);
                }
                if let Some(entry) = file {
                    if filters.matches(&entry.path, &entry.name) {
                        files_found += 1;
                        on_file_found(entry);
                    }
                }
                i = next.max(i + 32);
            }

            directories_scanned += 1;
            on_progress(
                &format!(
                    "exFAT: dir {}, found {} files",
                    directories_scanned, files_found
                ),
                (directories_scanned % 100) as f32 / 100.0,
            );

            if directories_scanned > config.directory_limit {
                debug!(directories_scanned, "directory limit reached");
                on_progress("Directory limit reached", 0.9);
                break;
            }
        }

        if cancel.load(Ordering::Acquire) {
            return Ok(false);
        }
        on_progress(
            &format!("exFAT scan complete: {} files found", files_found),
            1.0,
        );
        Ok(true)
    }
}
