//! The shared volume-walking contract.

use crate::domain::entities::{DeletedEntry, ScanConfig};
use crate::domain::error::Result;
use crate::domain::repositories::BlockDevice;
use std::sync::atomic::AtomicBool;

/// Receives each discovered candidate; the entry is owned by the callback.
pub type FileFoundCallback<'a> = dyn FnMut(DeletedEntry) + 'a;

/// `(message, fraction)` with `fraction` in `[0, 1]`; a negative fraction
/// is a status message that must not advance the bar.
pub type ProgressCallback<'a> = dyn FnMut(&str, f32) + 'a;

/// Lowercased substring filters; empty string = no restriction.
#[derive(Debug, Clone, Default)]
pub struct ScanFilters {
    pub folder: String,
    pub filename: String,
}

impl ScanFilters {
    pub fn new(folder: &str, filename: &str) -> Self {
        Self {
            folder: folder.to_lowercase(),
            filename: filename.to_lowercase(),
        }
    }

    /// Tests a candidate's virtual path and name against both filters.
    pub fn matches(&self, path: &str, name: &str) -> bool {
        (self.folder.is_empty() || path.to_lowercase().contains(&self.folder))
            && (self.filename.is_empty() || name.to_lowercase().contains(&self.filename))
    }
}

/// One filesystem walker. The three implementations share this contract
/// but no hierarchy; the orchestrator dispatches by filesystem tag.
///
/// Walkers must sample `cancel` (acquire ordering) at each directory-entry
/// boundary, each batch boundary, and at least every 10 MFT records.
pub trait VolumeWalker {
    /// Scans the volume and pushes every matching deleted entry through
    /// `on_file_found`. Returns `Ok(true)` when the walk completed,
    /// `Ok(false)` when it was cancelled.
    fn scan_volume(
        &mut self,
        device: &dyn BlockDevice,
        filters: &ScanFilters,
        on_file_found: &mut FileFoundCallback,
        on_progress: &mut ProgressCallback,
        cancel: &AtomicBool,
        config: &ScanConfig,
    ) -> Result<bool>;
}
