//! Scan options DTO

use crate::domain::entities::ScanConfig;
use serde::{Deserialize, Serialize};

/// Options for one scan run.
///
/// The stage toggles only apply to NTFS; exFAT and FAT32 have a single
/// walker stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOptions {
    /// Lowercased substring match against the virtual path.
    pub folder_filter: String,
    /// Lowercased substring match against the file name.
    pub filename_filter: String,
    /// Stage 1: MFT walk.
    pub enable_mft: bool,
    /// Stage 2: USN journal correlation.
    pub enable_usn: bool,
    /// Stage 3: signature carving.
    pub enable_carving: bool,
    /// Limits and corruption guards.
    pub config: ScanConfig,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            folder_filter: String::new(),
            filename_filter: String::new(),
            enable_mft: true,
            enable_usn: true,
            enable_carving: true,
            config: ScanConfig::default(),
        }
    }
}

impl ScanOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(mut self, folder: &str, filename: &str) -> Self {
        self.folder_filter = folder.to_string();
        self.filename_filter = filename.to_string();
        self
    }

    pub fn with_stages(mut self, mft: bool, usn: bool, carving: bool) -> Self {
        self.enable_mft = mft;
        self.enable_usn = usn;
        self.enable_carving = carving;
        self
    }

    pub fn with_config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }
}
