//! Streams recovered data from the source volume to output files.

use crate::domain::entities::{DeletedEntry, FileLocation};
use crate::domain::error::{ForensicsError, Result};
use crate::domain::repositories::{BlockDevice, ProgressCallback};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Checks that a recovery destination cannot overwrite the volume being
/// recovered from.
///
/// UNC paths are always allowed. A drive-lettered path must name a
/// different letter than the source. Absolute paths without a drive
/// letter (POSIX) cannot alias a lettered source volume and are allowed.
/// Relative paths are resolved first.
pub fn validate_destination(source_drive: char, dest: &str) -> bool {
    if dest.len() < 2 {
        return false;
    }
    if dest.starts_with("\\\\") {
        return true; // UNC network location
    }

    let bytes = dest.as_bytes();
    if bytes[1] == b':' {
        let dest_drive = (bytes[0] as char).to_ascii_uppercase();
        return dest_drive.is_ascii_alphabetic()
            && dest_drive != source_drive.to_ascii_uppercase();
    }
    if dest.starts_with('/') {
        return true;
    }

    // Relative path: resolve and retest against the absolute form.
    match std::path::absolute(dest) {
        Ok(abs) => {
            let abs = abs.to_string_lossy().into_owned();
            abs != dest && validate_destination(source_drive, &abs)
        }
        Err(_) => false,
    }
}

/// Writes `DeletedEntry` data back out of the raw volume.
pub struct RecoveryWriter;

impl RecoveryWriter {
    pub fn new() -> Self {
        Self
    }

    /// Recovers one entry to `output_path`, truncating any existing file.
    ///
    /// Unreadable sectors are replaced with zeros; a partial recovery
    /// beats none. Returns the number of bytes written.
    pub fn write_entry(
        &self,
        device: &dyn BlockDevice,
        entry: &DeletedEntry,
        output_path: &Path,
    ) -> Result<u64> {
        let resident_len = match &entry.location {
            FileLocation::Resident(bytes) => bytes.len(),
            _ => 0,
        };
        if entry.size == 0 && resident_len == 0 {
            // Nothing to recover at all.
            return Err(ForensicsError::LocationLost(entry.name.clone()));
        }
        if entry.location.is_empty() {
            // Metadata survived but every data pointer is gone.
            return Err(ForensicsError::LocationLost(entry.name.clone()));
        }

        let file = File::create(output_path)?;
        let mut out = BufWriter::new(file);

        if let FileLocation::Resident(bytes) = &entry.location {
            out.write_all(bytes)?;
            out.flush()?;
            debug!(name = %entry.name, bytes = bytes.len(), "resident recovery");
            return Ok(bytes.len() as u64);
        }

        let cluster_size = entry.cluster_size;
        let sector_size = device.sector_size();
        if cluster_size == 0 || sector_size == 0 {
            return Err(ForensicsError::RecordCorrupt(
                "invalid cluster or sector size".into(),
            ));
        }
        let sectors_per_cluster = cluster_size / sector_size;
        if sectors_per_cluster == 0 {
            return Err(ForensicsError::RecordCorrupt(
                "cluster smaller than a sector".into(),
            ));
        }

        let mut written: u64 = 0;
        match &entry.location {
            FileLocation::Ranges(ranges) => {
                'outer: for range in ranges {
                    for i in 0..range.count {
                        if written >= entry.size {
                            break 'outer;
                        }
                        let cluster = range.start_lcn + i;
                        written += self.write_cluster(
                            device,
                            &mut out,
                            cluster,
                            sectors_per_cluster,
                            sector_size,
                            cluster_size,
                            entry.size - written,
                        )?;
                    }
                }
            }
            FileLocation::Clusters(clusters) => {
                for &cluster in clusters {
                    if written >= entry.size {
                        break;
                    }
                    written += self.write_cluster(
                        device,
                        &mut out,
                        cluster,
                        sectors_per_cluster,
                        sector_size,
                        cluster_size,
                        entry.size - written,
                    )?;
                }
            }
            FileLocation::Resident(_) => unreachable!("handled above"),
        }

        out.flush()?;
        if written == 0 {
            return Err(ForensicsError::LocationLost(entry.name.clone()));
        }
        debug!(name = %entry.name, written, "cluster recovery");
        Ok(written)
    }

    /// Reads one cluster and writes `min(cluster_size, remaining)` bytes,
    /// zero-filling whatever the device could not deliver.
    #[allow(clippy::too_many_arguments)]
    fn write_cluster(
        &self,
        device: &dyn BlockDevice,
        out: &mut BufWriter<File>,
        cluster: u64,
        sectors_per_cluster: u64,
        sector_size: u64,
        cluster_size: u64,
        remaining: u64,
    ) -> Result<u64> {
        let sector = cluster * sectors_per_cluster;
        let data = device.read_sectors(sector, sectors_per_cluster, sector_size);
        let to_write = cluster_size.min(remaining) as usize;

        if data.is_empty() {
            warn!(cluster, "unreadable cluster, zero-filled");
            out.write_all(&vec![0u8; to_write])?;
        } else if data.len() >= to_write {
            out.write_all(&data[..to_write])?;
        } else {
            out.write_all(&data)?;
            out.write_all(&vec![0u8; to_write - data.len()])?;
        }
        Ok(to_write as u64)
    }

    /// Recovers a list of entries into `dest_folder`, named after each
    /// entry. A failed file aborts that file only; returns `true` when at
    /// least one file was written.
    pub fn recover_many(
        &self,
        device: &dyn BlockDevice,
        files: &[DeletedEntry],
        dest_folder: &Path,
        on_progress: &mut ProgressCallback,
    ) -> bool {
        if files.is_empty() {
            on_progress("No files to recover", 0.0);
            return false;
        }

        let total = files.len();
        let mut succeeded = 0usize;

        for (i, entry) in files.iter().enumerate() {
            on_progress(
                &format!("Recovering {} ({}/{})", entry.name, i + 1, total),
                i as f32 / total as f32,
            );

            let output_path = dest_folder.join(&entry.name);
            match self.write_entry(device, entry, &output_path) {
                Ok(written) => {
                    succeeded += 1;
                    on_progress(&format!("Recovered {} bytes for {}", written, entry.name), -1.0);
                }
                Err(err) => {
                    on_progress(&format!("Cannot recover {}: {}", entry.name, err), -1.0);
                }
            }
        }

        on_progress(
            &format!("Recovery complete: {}/{} files recovered", succeeded, total),
            1.0,
        );
        succeeded > 0
    }
}

impl Default for RecoveryWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unc_paths_are_always_allowed() {
        assert!(validate_destination('C', "\\\\server\\share\\out"));
    }

    #[test]
    fn same_drive_letter_is_rejected_case_insensitively() {
        assert!(!validate_destination('C', "c:\\recovered"));
        assert!(!validate_destination('c', "C:\\recovered"));
        assert!(validate_destination('C', "D:\\recovered"));
    }

    #[test]
    fn posix_absolute_paths_are_allowed() {
        assert!(validate_destination('C', "/tmp/recovered"));
    }

    #[test]
    fn degenerate_paths_are_rejected() {
        assert!(!validate_destination('C', ""));
        assert!(!validate_destination('C', "x"));
    }
}
