//! Breadth-first FAT32 directory traversal with LFN stitching.

use super::boot::Fat32BootSector;
use crate::domain::entities::{format_file_size, DeletedEntry, FileLocation, FilesystemType, ScanConfig};
use crate::domain::error::Result;
use crate::domain::repositories::{
    BlockDevice, FileFoundCallback, ProgressCallback, ScanFilters, VolumeWalker,
};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

const ENTRY_DELETED: u8 = 0xE5;
const ATTR_LFN: u8 = 0x0F;
const ATTR_DIRECTORY: u8 = 0x10;
const ATTR_VOLUME_ID: u8 = 0x08;
const LFN_LAST_ENTRY: u8 = 0x40;

struct DirectoryWorkItem {
    first_cluster: u32,
    path: String,
}

pub struct Fat32Walker;

impl Fat32Walker {
    pub fn new() -> Self {
        Self
    }

    /// Reads a directory chain assuming contiguous clusters. Deleted
    /// files have no FAT chain at all, and for active directories the
    /// contiguous assumption holds on all but heavily fragmented media.
    fn read_directory_chain(
        &self,
        device: &dyn BlockDevice,
        boot: &Fat32BootSector,
        start_cluster: u32,
        config: &ScanConfig,
    ) -> Vec<u8> {
        if start_cluster < 2 {
            return Vec::new();
        }

        let mut buffer = Vec::new();
        let mut cluster = start_cluster;
        let mut budget = config.fat32_chain_limit;

        while (2..0x0FFF_FFF7).contains(&cluster) && budget > 0 {
            let sector = boot.data_start_sector()
                + (cluster as u64 - 2) * boot.sectors_per_cluster as u64;
            let data = device.read_sectors(
                sector,
                boot.sectors_per_cluster as u64,
                boot.bytes_per_sector as u64,
            );
            if data.is_empty() {
                break;
            }
            buffer.extend_from_slice(&data);
            if config.directory_read_limit > 0
                && buffer.len() as u64 >= config.directory_read_limit
            {
                break;
            }
            cluster += 1;
            budget -= 1;
        }
        buffer
    }
}

impl Default for Fat32Walker {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeWalker for Fat32Walker {
    fn scan_volume(
        &mut self,
        device: &dyn BlockDevice,
        filters: &ScanFilters,
        on_file_found: &mut FileFoundCallback,
        on_progress: &mut ProgressCallback,
        cancel: &AtomicBool,
        config: &ScanConfig,
    ) -> Result<bool> {
        let boot_data = device.read_sectors(0, 1, device.sector_size());
        let boot = Fat32BootSector::parse(&boot_data)?;

        let mut queue: VecDeque<DirectoryWorkItem> = VecDeque::new();
        queue.push_back(DirectoryWorkItem {
            first_cluster: boot.root_cluster,
            path: String::new(),
        });

        let mut directories_scanned: u64 = 0;
        let mut files_found: u64 = 0;

        on_progress("Starting FAT32 structure scan...", 0.0);

        while let Some(dir) = queue.pop_front() {
            if cancel.load(Ordering::Acquire) {
                return Ok(false);
            }

            let data = self.read_directory_chain(device, &boot, dir.first_cluster, config);
            process_directory(
                &boot,
                &data,
                &dir.path,
                filters,
                &mut queue,
                &mut files_found,
                on_file_found,
                cancel,
            );
            directories_scanned += 1;

            if directories_scanned % 10 == 0 {
                on_progress(
                    &format!(
                        "FAT32 scan: {} directories, {} deleted files found",
                        directories_scanned, files_found
                    ),
                    0.5,
                );
            }
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
            &format!("FAT32 scan complete: {} files found", files_found),
            1.0,
        );
        Ok(true)
    }
}

#[allow(clippy::too_many_arguments)]
fn process_directory(
    boot: &Fat32BootSector,
    data: &[u8],
    dir_path: &str,
    filters: &ScanFilters,
    queue: &mut VecDeque<DirectoryWorkItem>,
    files_found: &mut u64,
    on_file_found: &mut FileFoundCallback,
    cancel: &AtomicBool,
) {
    let mut lfn_buffer = String::new();

    for raw in data.chunks_exact(32) {
        if cancel.load(Ordering::Acquire) {
            return;
        }

        let marker = raw[0];
        let attr = raw[11];

        if marker == 0x00 {
            break;
        }

        if attr == ATTR_LFN {
            // A deleted LFN's first byte is 0xE5, which also carries the
            // 0x40 "last entry" bit; clearing the buffer for those would
            // lose every deleted long name.
            let is_deleted_lfn = marker == ENTRY_DELETED;
            if raw[0] & LFN_LAST_ENTRY != 0 && !is_deleted_lfn {
                lfn_buffer.clear();
            }
            let part = decode_lfn_fragment(raw);
            // Fragments are stored last-first; prepend to reassemble.
            lfn_buffer.insert_str(0, &part);
            continue;
        }

        let is_dir = attr & ATTR_DIRECTORY != 0;
        let is_volume_id = attr & ATTR_VOLUME_ID != 0;
        let is_deleted = marker == ENTRY_DELETED;

        if is_volume_id || raw[0] == b'.' {
            lfn_buffer.clear();
            continue;
        }

        let mut name = if lfn_buffer.is_empty() {
            let mut short = parse_short_name(&raw[0..11]);
            if is_deleted && !short.is_empty() {
                // The tombstone overwrote the first character.
                short.remove(0);
                short.insert(0, '_');
            }
            short
        } else {
            lfn_buffer.clone()
        };
        lfn_buffer.clear();

        let cluster =
            (LittleEndian::read_u16(&raw[20..22]) as u32) << 16 | LittleEndian::read_u16(&raw[26..28]) as u32;
        let file_size = LittleEndian::read_u32(&raw[28..32]) as u64;

        // Deleted short names collapse (FILE~1 and _ILE~1 collide); the
        // start cluster disambiguates duplicates.
        if is_deleted && cluster >= 2 {
            let suffix = format!("_{}", cluster);
            match name.rfind('.') {
                Some(dot) => name.insert_str(dot, &suffix),
                None => name.push_str(&suffix),
            }
        }

        let full_path = if dir_path.is_empty() {
            name.clone()
        } else {
            format!("{}\\{}", dir_path, name)
        };

        if is_dir {
            if cluster >= 2 && !is_deleted {
                queue.push_back(DirectoryWorkItem {
                    first_cluster: cluster,
                    path: full_path,
                });
            }
            continue;
        }

        if !is_deleted {
            continue;
        }

        let path = format!("<FAT32>\\{}", full_path);
        if !filters.matches(&path, &name) {
            continue;
        }

        let mut entry = DeletedEntry::new(FilesystemType::Fat32);
        entry.name = name;
        entry.path = path;
        entry.size = file_size;
        entry.size_formatted = format_file_size(file_size);
        entry.is_recoverable = true;
        entry.cluster_size = boot.cluster_size();

        // The FAT chain was cleared on deletion; assume contiguous
        // allocation and convert to absolute LCNs.
        if cluster >= 2 && file_size > 0 {
            let base = boot.data_start_sector() / boot.sectors_per_cluster as u64;
            let start_lcn = base + (cluster as u64 - 2);
            let count = file_size.div_ceil(boot.cluster_size());
            entry.location = FileLocation::Clusters((0..count).map(|i| start_lcn + i).collect());
        }

        *files_found += 1;
        on_file_found(entry);
    }
}

/// Decodes the three UTF-16 slices of one LFN entry (5 + 6 + 2 units),
/// dropping padding (0x0000 / 0xFFFF).
fn decode_lfn_fragment(raw: &[u8]) -> String {
    let mut units: Vec<u16> = Vec::with_capacity(13);
    let slices: [(usize, usize); 3] = [(1, 5), (14, 6), (28, 2)];
    for (start, count) in slices {
        for k in 0..count {
            let unit = LittleEndian::read_u16(&raw[start + k * 2..start + k * 2 + 2]);
            if unit != 0 && unit != 0xFFFF {
                units.push(unit);
            }
        }
    }
    String::from_utf16_lossy(&units)
}

/// Trims an 8.3 short name into display form: `FOO     TXT` becomes
/// `FOO.TXT`.
fn parse_short_name(raw: &[u8]) -> String {
    let mut name = String::new();
    for &b in &raw[0..8] {
        if b != b' ' && b != 0 {
            name.push(b as char);
        }
    }
    if raw[8] != b' ' && raw[8] != 0 {
        name.push('.');
        for &b in &raw[8..11] {
            if b != b' ' && b != 0 {
                name.push(b as char);
            }
        }
    }
    name
}
