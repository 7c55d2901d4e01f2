//! NTFS boot sector (BIOS parameter block) parsing.

use crate::domain::error::ForensicsError;
use byteorder::{ByteOrder, LittleEndian};

const NTFS_OEM_ID: &[u8; 8] = b"NTFS    ";

/// The boot-sector fields the walker needs.
#[derive(Debug, Clone, Copy)]
pub struct NtfsBootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub total_sectors: u64,
    /// LCN of the MFT.
    pub mft_cluster: u64,
    /// Positive: clusters per record. Negative: record is `1 << -value`
    /// bytes.
    pub clusters_per_mft_record: i8,
}

impl NtfsBootSector {
    /// Parses and validates the sector read at LBA 0.
    pub fn parse(data: &[u8]) -> Result<Self, ForensicsError> {
        if data.len() < 512 {
            return Err(ForensicsError::BadBootSector(
                "NTFS boot sector too small".into(),
            ));
        }
        if &data[3..11] != NTFS_OEM_ID {
            return Err(ForensicsError::BadBootSector("missing NTFS OEM ID".into()));
        }

        let boot = Self {
            bytes_per_sector: LittleEndian::read_u16(&data[11..13]),
            sectors_per_cluster: data[13],
            total_sectors: LittleEndian::read_u64(&data[40..48]),
            mft_cluster: LittleEndian::read_u64(&data[48..56]),
            clusters_per_mft_record: data[64] as i8,
        };

        if boot.bytes_per_sector < 512 || boot.sectors_per_cluster == 0 || boot.total_sectors == 0
        {
            return Err(ForensicsError::BadBootSector(
                "impossible NTFS geometry".into(),
            ));
        }
        Ok(boot)
    }

    pub fn bytes_per_cluster(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// MFT record size; negative `clusters_per_mft_record` encodes a
    /// power-of-two byte count (1 KiB on real volumes).
    pub fn mft_record_size(&self) -> u64 {
        if self.clusters_per_mft_record >= 0 {
            self.clusters_per_mft_record as u64 * self.bytes_per_cluster()
        } else {
            1u64 << (-(self.clusters_per_mft_record as i64))
        }
    }

    /// Byte offset of the first MFT record.
    pub fn mft_offset(&self) -> u64 {
        self.mft_cluster * self.bytes_per_cluster()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_bytes() -> Vec<u8> {
        let mut data = vec![0u8; 512];
        data[3..11].copy_from_slice(b"NTFS    ");
        data[11..13].copy_from_slice(&512u16.to_le_bytes());
        data[13] = 8;
        data[40..48].copy_from_slice(&100_000u64.to_le_bytes());
        data[48..56].copy_from_slice(&4u64.to_le_bytes());
        data[64] = 0xF6; // -10: 1 KiB records
        data
    }

    #[test]
    fn parses_geometry() {
        let boot = NtfsBootSector::parse(&boot_bytes()).unwrap();
        assert_eq!(boot.bytes_per_cluster(), 4096);
        assert_eq!(boot.mft_record_size(), 1024);
        assert_eq!(boot.mft_offset(), 16384);
    }

    #[test]
    fn positive_record_size_is_in_clusters() {
        let mut data = boot_bytes();
        data[64] = 1;
        let boot = NtfsBootSector::parse(&data).unwrap();
        assert_eq!(boot.mft_record_size(), 4096);
    }

    #[test]
    fn rejects_wrong_oem() {
        let mut data = boot_bytes();
        data[3..11].copy_from_slice(b"MSDOS5.0");
        assert!(NtfsBootSector::parse(&data).is_err());
    }
}
