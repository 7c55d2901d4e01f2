//! Recover files use case

use crate::domain::entities::DeletedEntry;
use crate::domain::repositories::{BlockDevice, ProgressCallback};
use crate::infrastructure::persistence::{validate_destination, RecoveryWriter};
use std::path::Path;
use tracing::info;

/// Streams a selection of scan results out to a destination folder.
pub struct RecoverFilesUseCase {
    writer: RecoveryWriter,
}

impl RecoverFilesUseCase {
    pub fn new() -> Self {
        Self {
            writer: RecoveryWriter::new(),
        }
    }

    /// Recovers `files` into `dest_folder`.
    ///
    /// When `source_drive` is known the destination is validated against
    /// it first: recovering onto the volume being scanned would overwrite
    /// the very clusters under recovery. Returns `true` when at least one
    /// file was written.
    pub fn execute(
        &self,
        device: &dyn BlockDevice,
        files: &[DeletedEntry],
        source_drive: Option<char>,
        dest_folder: &Path,
        on_progress: &mut ProgressCallback,
    ) -> bool {
        if let Some(drive) = source_drive {
            let dest = dest_folder.to_string_lossy();
            if !validate_destination(drive, &dest) {
                on_progress("Invalid destination - cannot recover to source drive", 0.0);
                return false;
            }
        }

        if let Err(err) = std::fs::create_dir_all(dest_folder) {
            on_progress(&format!("Cannot create destination folder: {}", err), 0.0);
            return false;
        }

        info!(files = files.len(), dest = %dest_folder.display(), "recovering files");
        self.writer
            .recover_many(device, files, dest_folder, on_progress)
    }

    /// Recovers a single entry to an explicit output path.
    pub fn execute_one(
        &self,
        device: &dyn BlockDevice,
        file: &DeletedEntry,
        source_drive: Option<char>,
        output_path: &Path,
        on_progress: &mut ProgressCallback,
    ) -> bool {
        if let Some(drive) = source_drive {
            let dest = output_path.to_string_lossy();
            if !validate_destination(drive, &dest) {
                on_progress("Invalid destination - cannot recover to source drive", 0.0);
                return false;
            }
        }

        match self.writer.write_entry(device, file, output_path) {
            Ok(written) => {
                on_progress(&format!("Recovered {} bytes for {}", written, file.name), 1.0);
                true
            }
            Err(err) => {
                on_progress(&format!("Cannot recover {}: {}", file.name, err), -1.0);
                false
            }
        }
    }
}

impl Default for RecoverFilesUseCase {
    fn default() -> Self {
        Self::new()
    }
}
