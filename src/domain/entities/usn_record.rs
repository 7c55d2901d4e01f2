//! Decoded `USN_RECORD_V2` entries from the NTFS change journal.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// `USN_REASON_FILE_DELETE` reason flag.
pub const USN_REASON_FILE_DELETE: u32 = 0x0000_0200;

/// `FILE_ATTRIBUTE_DIRECTORY` attribute flag.
pub const FILE_ATTRIBUTE_DIRECTORY: u32 = 0x0000_0010;

/// Offset between the Windows FILETIME epoch (1601) and the Unix epoch,
/// in 100 ns ticks.
const FILETIME_UNIX_DIFF: u64 = 116_444_736_000_000_000;

/// One parsed `USN_RECORD_V2` (major version 2, minor 0).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsnRecord {
    pub record_length: u32,
    pub major_version: u16,
    pub minor_version: u16,
    /// MFT index in the low 48 bits, sequence number in the high 16.
    pub file_reference_number: u64,
    pub parent_file_reference_number: u64,
    pub usn: i64,
    /// Wall-clock instant converted from the FILETIME stamp; `None` for
    /// stamps before 1970.
    pub timestamp: Option<SystemTime>,
    pub reason: u32,
    pub source_info: u32,
    pub security_id: u32,
    pub file_attributes: u32,
    pub filename: String,
}

impl UsnRecord {
    /// MFT record index addressed by this record.
    pub fn mft_index(&self) -> u64 {
        self.file_reference_number & 0x0000_FFFF_FFFF_FFFF
    }

    /// Sequence number of the referenced MFT record.
    pub fn sequence_number(&self) -> u16 {
        ((self.file_reference_number >> 48) & 0xFFFF) as u16
    }

    pub fn is_deletion(&self) -> bool {
        self.reason & USN_REASON_FILE_DELETE != 0
    }

    pub fn is_directory(&self) -> bool {
        self.file_attributes & FILE_ATTRIBUTE_DIRECTORY != 0
    }
}

/// Converts a Windows FILETIME (100 ns ticks since 1601-01-01) to a
/// wall-clock instant.
pub fn filetime_to_system_time(filetime: u64) -> Option<SystemTime> {
    let unix_ticks = filetime.checked_sub(FILETIME_UNIX_DIFF)?;
    let secs = unix_ticks / 10_000_000;
    let nanos = (unix_ticks % 10_000_000) * 100;
    UNIX_EPOCH.checked_add(Duration::new(secs, nanos as u32))
}
