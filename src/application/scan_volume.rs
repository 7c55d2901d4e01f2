//! Scan orchestration
//!
//! Detect-and-dispatch over the filesystem walkers. NTFS gets the full
//! three-stage treatment (MFT walk, USN correlation, signature carving)
//! with MFT-index deduplication across stages 1 and 2; exFAT and FAT32
//! run their single walker.

use crate::application::dto::ScanOptions;
use crate::domain::entities::{format_file_size, DeletedEntry, FileLocation, FilesystemType};
use crate::domain::repositories::{
    BlockDevice, FileFoundCallback, ProgressCallback, ScanFilters, VolumeWalker,
};
use crate::infrastructure::carvers::RegionCarver;
use crate::infrastructure::file_systems::exfat::ExFatWalker;
use crate::infrastructure::file_systems::fat32::Fat32Walker;
use crate::infrastructure::file_systems::ntfs::{
    has_file_signature, read_mft_record, record_sequence_number, NtfsWalker,
};
use crate::infrastructure::journal::UsnJournalReader;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Clusters carved per batch (256 MiB at 4 KiB clusters).
const CLUSTERS_PER_CARVE_BATCH: u64 = 65_536;

/// Maps a stage-local progress fraction onto the stage's slice of the
/// whole scan's [0, 1] axis. Negative fractions (status-only messages)
/// pass through untouched.
#[derive(Clone, Copy)]
struct StageAxis {
    base: f32,
    share: f32,
}

impl StageAxis {
    fn scale(&self, fraction: f32) -> f32 {
        if fraction < 0.0 {
            fraction
        } else {
            self.base + fraction * self.share
        }
    }
}

/// Orchestrates one scan over an opened device.
pub struct ScanVolumeUseCase {
    ntfs: NtfsWalker,
    exfat: ExFatWalker,
    fat32: Fat32Walker,
    carver: RegionCarver,
    journal: UsnJournalReader,
    processed_mft: HashSet<u64>,
}

impl ScanVolumeUseCase {
    pub fn new() -> Self {
        Self {
            ntfs: NtfsWalker::new(),
            exfat: ExFatWalker::new(),
            fat32: Fat32Walker::new(),
            carver: RegionCarver::default(),
            journal: UsnJournalReader::new(),
            processed_mft: HashSet::new(),
        }
    }

    /// Runs the scan. Returns `true` when any stage produced at least
    /// one entry.
    pub fn execute(
        &mut self,
        device: &mut dyn BlockDevice,
        fs_type: FilesystemType,
        options: &ScanOptions,
        on_file_found: &mut FileFoundCallback,
        on_progress: &mut ProgressCallback,
        cancel: &AtomicBool,
    ) -> bool {
        info!(filesystem = %fs_type, "starting scan");
        let mut emitted: u64 = 0;
        {
            let mut counting = |entry: DeletedEntry| {
                emitted += 1;
                on_file_found(entry);
            };
            let filters = ScanFilters::new(&options.folder_filter, &options.filename_filter);

            match fs_type {
                FilesystemType::Ntfs => {
                    self.ntfs_multi_stage(
                        device,
                        options,
                        &filters,
                        &mut counting,
                        on_progress,
                        cancel,
                    );
                }
                FilesystemType::ExFat => {
                    on_progress("Scanning exFAT filesystem...", 0.0);
                    self.run_single_walker(
                        WalkerKind::ExFat,
                        device,
                        options,
                        &filters,
                        &mut counting,
                        on_progress,
                        cancel,
                    );
                }
                FilesystemType::Fat32 => {
                    on_progress("Scanning FAT32 filesystem...", 0.0);
                    self.run_single_walker(
                        WalkerKind::Fat32,
                        device,
                        options,
                        &filters,
                        &mut counting,
                        on_progress,
                        cancel,
                    );
                }
                FilesystemType::Unknown => {
                    on_progress("Unsupported filesystem type", 0.0);
                }
            }
        }
        info!(emitted, "scan finished");
        emitted > 0
    }

    #[allow(clippy::too_many_arguments)]
    fn run_single_walker(
        &mut self,
        kind: WalkerKind,
        device: &mut dyn BlockDevice,
        options: &ScanOptions,
        filters: &ScanFilters,
        on_file_found: &mut FileFoundCallback,
        on_progress: &mut ProgressCallback,
        cancel: &AtomicBool,
    ) {
        let walker: &mut dyn VolumeWalker = match kind {
            WalkerKind::ExFat => &mut self.exfat,
            WalkerKind::Fat32 => &mut self.fat32,
        };
        match walker.scan_volume(device, filters, on_file_found, on_progress, cancel, &options.config)
        {
            Ok(true) => {}
            Ok(false) => on_progress("Scan stopped by user", 1.0),
            Err(err) => on_progress(&format!("Scan failed: {}", err), 0.0),
        }
    }

    fn ntfs_multi_stage(
        &mut self,
        device: &mut dyn BlockDevice,
        options: &ScanOptions,
        filters: &ScanFilters,
        on_file_found: &mut FileFoundCallback,
        on_progress: &mut ProgressCallback,
        cancel: &AtomicBool,
    ) {
        let Self {
            ntfs,
            carver,
            journal,
            processed_mft,
            ..
        } = self;
        processed_mft.clear();

        let enabled = [options.enable_mft, options.enable_usn, options.enable_carving];
        let stage_count = enabled.iter().filter(|e| **e).count();
        if stage_count == 0 {
            on_progress("No scan stages enabled", 0.0);
            return;
        }
        let share = 1.0 / stage_count as f32;
        let mut next_stage = 0usize;

        // Stage 1: MFT walk. Every emitted index lands in the
        // deduplication set so later stages skip it.
        if options.enable_mft {
            let axis = StageAxis { base: next_stage as f32 * share, share };
            next_stage += 1;
            on_progress("Stage 1: scanning MFT for deleted files...", axis.scale(0.0));

            let outcome = {
                let mut stage_cb = |entry: DeletedEntry| {
                    if let Some(index) = entry.mft_record {
                        processed_mft.insert(index);
                    }
                    on_file_found(entry);
                };
                let mut stage_progress =
                    |msg: &str, fraction: f32| on_progress(msg, axis.scale(fraction));
                ntfs.scan_volume(
                    device,
                    filters,
                    &mut stage_cb,
                    &mut stage_progress,
                    cancel,
                    &options.config,
                )
            };
            match outcome {
                Ok(true) => {}
                Ok(false) => {
                    on_progress("Scan stopped by user", 1.0);
                    return;
                }
                Err(err) => {
                    on_progress(&format!("MFT stage failed: {}", err), axis.scale(1.0));
                }
            }
        }

        // Stage 2: USN journal correlation.
        if options.enable_usn {
            let axis = StageAxis { base: next_stage as f32 * share, share };
            next_stage += 1;
            on_progress("Stage 2: analyzing USN journal...", axis.scale(0.0));

            let stopped = usn_stage(
                ntfs,
                journal,
                processed_mft,
                device,
                options,
                &axis,
                on_file_found,
                on_progress,
                cancel,
            );
            if stopped {
                on_progress("Scan stopped by user", 1.0);
                return;
            }
        }

        // Stage 3: signature carving over the data area.
        if options.enable_carving {
            let axis = StageAxis { base: next_stage as f32 * share, share };
            on_progress(
                "Stage 3: carving files from free space (memory-mapped)...",
                axis.scale(0.0),
            );
            let stopped = carving_stage(
                carver,
                device,
                options,
                &axis,
                on_file_found,
                on_progress,
                cancel,
            );
            if stopped {
                on_progress("Scan stopped by user", 1.0);
                return;
            }
        }

        on_progress("Scan complete!", 1.0);
    }
}

impl Default for ScanVolumeUseCase {
    fn default() -> Self {
        Self::new()
    }
}

enum WalkerKind {
    ExFat,
    Fat32,
}

/// Stage 2: correlate journal deletion records against the live MFT.
///
/// Returns `true` when the scan was cancelled mid-stage.
#[allow(clippy::too_many_arguments)]
fn usn_stage(
    ntfs: &mut NtfsWalker,
    journal: &UsnJournalReader,
    processed_mft: &mut HashSet<u64>,
    device: &dyn BlockDevice,
    options: &ScanOptions,
    axis: &StageAxis,
    on_file_found: &mut FileFoundCallback,
    on_progress: &mut ProgressCallback,
    cancel: &AtomicBool,
) -> bool {
    let boot = match ntfs.read_boot_sector(device) {
        Ok(boot) => boot,
        Err(_) => {
            on_progress("USN journal: not a valid NTFS drive", axis.scale(1.0));
            return false;
        }
    };

    let by_mft = match journal.parse_journal(device, &boot, &options.config) {
        Ok(map) => map,
        Err(err) => {
            on_progress(&format!("USN journal not available: {}", err), axis.scale(1.0));
            return false;
        }
    };

    let total: u64 = by_mft.values().map(|v| v.len() as u64).sum();
    if total == 0 {
        on_progress("USN journal: no deletion records found", axis.scale(1.0));
        return false;
    }

    let mut processed: u64 = 0;
    let mut recovered: u64 = 0;
    let mut overwritten: u64 = 0;

    for (mft_index, records) in &by_mft {
        for record in records {
            if cancel.load(Ordering::Acquire) {
                return true;
            }

            if record.is_deletion() && !record.is_directory() {
                if processed_mft.contains(mft_index) {
                    processed += 1;
                    continue;
                }

                let data = read_mft_record(device, &boot, *mft_index);
                let mut matched = false;

                // Sequence equality means the MFT slot still describes
                // the deleted file (tombstone), so its data runs are
                // still valid.
                if has_file_signature(&data)
                    && record_sequence_number(&data) == record.sequence_number()
                {
                    if let Some(mut entry) =
                        ntfs.build_entry_unchecked(device, &boot, &data, *mft_index)
                    {
                        entry.deleted_time = record.timestamp;
                        processed_mft.insert(*mft_index);
                        on_file_found(entry);
                        matched = true;
                        recovered += 1;
                    }
                }

                if !matched {
                    // The slot was reused by another file; only the
                    // journal metadata survives.
                    let mut entry = DeletedEntry::new(FilesystemType::Ntfs);
                    entry.name = record.filename.clone();
                    entry.path = "<USN: MFT Overwritten>".to_string();
                    entry.mft_record = Some(*mft_index);
                    entry.size_formatted = "Metadata Only".to_string();
                    entry.deleted_time = record.timestamp;
                    processed_mft.insert(*mft_index);
                    on_file_found(entry);
                    overwritten += 1;
                }
            }

            processed += 1;
            if processed % 1_000 == 0 {
                on_progress(
                    &format!(
                        "USN journal: {} / {} records ({} recovered, {} overwritten)",
                        processed, total, recovered, overwritten
                    ),
                    axis.scale(processed as f32 / total as f32),
                );
            }
        }
    }

    on_progress(
        &format!(
            "USN journal complete: {} recovered, {} metadata only",
            recovered, overwritten
        ),
        axis.scale(1.0),
    );
    false
}

/// Stage 3: batch the data area through the region carver.
///
/// Returns `true` when the scan was cancelled mid-stage.
fn carving_stage(
    carver: &RegionCarver,
    device: &mut dyn BlockDevice,
    options: &ScanOptions,
    axis: &StageAxis,
    on_file_found: &mut FileFoundCallback,
    on_progress: &mut ProgressCallback,
    cancel: &AtomicBool,
) -> bool {
    let sector_size = device.sector_size();
    let disk_size = device.total_bytes();
    if sector_size == 0 || disk_size == 0 {
        on_progress("Cannot determine device geometry for carving", axis.scale(1.0));
        return false;
    }

    let boot_data = device.read_sectors(0, 1, sector_size);
    if boot_data.len() < 512 {
        on_progress("Cannot read boot sector for carving", axis.scale(1.0));
        return false;
    }

    let mut sectors_per_cluster = boot_data[13] as u64;
    if sectors_per_cluster == 0 {
        sectors_per_cluster = 8;
    }
    let bytes_per_cluster = sectors_per_cluster * sector_size;
    let total_clusters = disk_size / sector_size / sectors_per_cluster;

    // A zero cluster limit means scan the whole disk.
    let limit = options.config.carving_cluster_limit;
    let max_clusters = if limit > 0 && limit < total_clusters {
        on_progress(
            &format!(
                "File carving limited to {} clusters ({:.2} GB)",
                limit,
                (limit * bytes_per_cluster) as f64 / 1e9
            ),
            axis.scale(0.0),
        );
        limit
    } else {
        on_progress(
            &format!(
                "File carving scanning full disk: {} clusters ({:.2} GB)",
                total_clusters,
                (total_clusters * bytes_per_cluster) as f64 / 1e9
            ),
            axis.scale(0.0),
        );
        total_clusters
    };

    // Heap offset of two clusters makes the carver's LCNs absolute, so
    // cluster N recovers from byte N * bytes_per_cluster.
    let cluster_heap_offset = 2 * sectors_per_cluster;

    let mut files_found: u64 = 0;
    let mut batch_start: u64 = 2;

    while batch_start < max_clusters && files_found < options.config.carving_max_files {
        if cancel.load(Ordering::Acquire) {
            on_progress(
                &format!("File carving stopped: {} files found", files_found),
                -1.0,
            );
            return true;
        }

        let clusters_in_batch = CLUSTERS_PER_CARVE_BATCH.min(max_clusters - batch_start);
        let hits = carver.scan_region(
            device,
            batch_start,
            clusters_in_batch,
            sectors_per_cluster,
            cluster_heap_offset,
            sector_size,
            options.config.carving_max_files - files_found,
        );

        for hit in hits {
            files_found += 1;

            let mut entry = DeletedEntry::new(FilesystemType::Ntfs);
            entry.name = format!("{}.{}", files_found, hit.extension);
            entry.path = "<carved from free space>".to_string();
            entry.size = hit.file_size;
            entry.size_formatted = format_file_size(hit.file_size);
            entry.is_recoverable = true;
            entry.cluster_size = bytes_per_cluster;

            let clusters_needed = hit.file_size.div_ceil(bytes_per_cluster);
            entry.location = FileLocation::Clusters(
                (0..clusters_needed).map(|i| hit.start_cluster + i).collect(),
            );

            // A hit whose span crosses the scanned window cannot be
            // trusted end-to-end.
            if hit.start_cluster + clusters_needed > batch_start + clusters_in_batch {
                entry.is_recoverable = false;
                entry.size_formatted = "carve truncated".to_string();
            }

            on_file_found(entry);
        }

        let fraction = batch_start as f32 / max_clusters as f32;
        on_progress(
            &format!(
                "File carving: {:.1}% ({:.2} / {:.2} GB) - {} files found",
                fraction * 100.0,
                (batch_start * bytes_per_cluster) as f64 / 1e9,
                (max_clusters * bytes_per_cluster) as f64 / 1e9,
                files_found
            ),
            axis.scale(fraction),
        );

        batch_start += clusters_in_batch;
    }

    on_progress(
        &format!("File carving complete: {} files found", files_found),
        axis.scale(1.0),
    );
    false
}
