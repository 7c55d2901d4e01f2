//! Filesystem walkers
//!
//! One module per supported on-disk format plus boot-sector sniffing for
//! disk images, where no mounted-volume query is available.

pub mod exfat;
pub mod fat32;
pub mod ntfs;

use crate::domain::entities::FilesystemType;
use crate::domain::repositories::BlockDevice;
use byteorder::{ByteOrder, LittleEndian};

/// Identifies the filesystem from the boot sector at LBA 0.
///
/// Order matters: exFAT carries a FAT-compatible 0xAA55 signature, so the
/// OEM names are tested before the FAT32 geometry checks.
pub fn detect_filesystem(device: &dyn BlockDevice) -> FilesystemType {
    let boot = device.read_sectors(0, 1, device.sector_size());
    if boot.len() < 512 {
        return FilesystemType::Unknown;
    }

    if &boot[3..11] == b"NTFS    " {
        return FilesystemType::Ntfs;
    }
    if &boot[3..11] == b"EXFAT   " {
        return FilesystemType::ExFat;
    }

    let signature = LittleEndian::read_u16(&boot[510..512]);
    let root_entry_count = LittleEndian::read_u16(&boot[17..19]);
    let fat_size_16 = LittleEndian::read_u16(&boot[22..24]);
    let bytes_per_sector = LittleEndian::read_u16(&boot[11..13]);
    if signature == 0xAA55
        && root_entry_count == 0
        && fat_size_16 == 0
        && bytes_per_sector > 0
        && boot[13] > 0
    {
        return FilesystemType::Fat32;
    }

    FilesystemType::Unknown
}
