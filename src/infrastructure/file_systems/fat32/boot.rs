//! FAT32 boot sector parsing.

use crate::domain::error::ForensicsError;
use byteorder::{ByteOrder, LittleEndian};

#[derive(Debug, Clone, Copy)]
pub struct Fat32BootSector {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub number_of_fats: u8,
    pub fat_size_32: u32,
    pub root_cluster: u32,
}

impl Fat32BootSector {
    /// Parses the sector at LBA 0. FAT32 is distinguished from its older
    /// siblings by a zero root-entry count and a zero 16-bit FAT size.
    pub fn parse(data: &[u8]) -> Result<Self, ForensicsError> {
        if data.len() < 512 {
            return Err(ForensicsError::BadBootSector(
                "FAT32 boot sector too small".into(),
            ));
        }
        if LittleEndian::read_u16(&data[510..512]) != 0xAA55 {
            return Err(ForensicsError::BadBootSector(
                "missing 0xAA55 boot signature".into(),
            ));
        }
        if LittleEndian::read_u16(&data[17..19]) != 0 || LittleEndian::read_u16(&data[22..24]) != 0
        {
            return Err(ForensicsError::BadBootSector("not a FAT32 volume".into()));
        }

        let boot = Self {
            bytes_per_sector: LittleEndian::read_u16(&data[11..13]),
            sectors_per_cluster: data[13],
            reserved_sectors: LittleEndian::read_u16(&data[14..16]),
            number_of_fats: data[16],
            fat_size_32: LittleEndian::read_u32(&data[36..40]),
            root_cluster: LittleEndian::read_u32(&data[44..48]),
        };

        if boot.bytes_per_sector == 0 || boot.sectors_per_cluster == 0 {
            return Err(ForensicsError::BadBootSector(
                "impossible FAT32 geometry".into(),
            ));
        }
        Ok(boot)
    }

    pub fn cluster_size(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }

    /// First sector of the data area.
    pub fn data_start_sector(&self) -> u64 {
        self.reserved_sectors as u64 + self.number_of_fats as u64 * self.fat_size_32 as u64
    }
}
