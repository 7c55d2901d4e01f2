//! exFAT boot sector parsing.

use crate::domain::error::ForensicsError;
use byteorder::{ByteOrder, LittleEndian};

const EXFAT_OEM_ID: &[u8; 8] = b"EXFAT   ";

#[derive(Debug, Clone, Copy)]
pub struct ExFatBootSector {
    /// Sector size is `1 << bytes_per_sector_shift`; valid shifts are
    /// 9..=16.
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    /// First sector of the cluster heap.
    pub cluster_heap_offset: u32,
    pub root_directory_cluster: u32,
    /// First sector of the FAT.
    pub fat_offset: u32,
    pub fat_length: u32,
}

impl ExFatBootSector {
    pub fn parse(data: &[u8]) -> Result<Self, ForensicsError> {
        if data.len() < 512 {
            return Err(ForensicsError::BadBootSector(
                "exFAT boot sector too small".into(),
            ));
        }
        if &data[3..11] != EXFAT_OEM_ID {
            return Err(ForensicsError::BadBootSector("missing exFAT OEM ID".into()));
        }

        let boot = Self {
            bytes_per_sector_shift: data[108],
            sectors_per_cluster_shift: data[109],
            cluster_heap_offset: LittleEndian::read_u32(&data[88..92]),
            root_directory_cluster: LittleEndian::read_u32(&data[96..100]),
            fat_offset: LittleEndian::read_u32(&data[80..84]),
            fat_length: LittleEndian::read_u32(&data[84..88]),
        };

        if boot.bytes_per_sector_shift < 9 || boot.bytes_per_sector_shift > 16 {
            return Err(ForensicsError::BadBootSector(
                "invalid exFAT sector size shift".into(),
            ));
        }
        if boot.root_directory_cluster < 2 {
            return Err(ForensicsError::BadBootSector(
                "invalid exFAT root directory cluster".into(),
            ));
        }
        Ok(boot)
    }

    pub fn sector_size(&self) -> u64 {
        1u64 << self.bytes_per_sector_shift
    }

    pub fn sectors_per_cluster(&self) -> u64 {
        1u64 << self.sectors_per_cluster_shift
    }

    pub fn cluster_size(&self) -> u64 {
        self.sector_size() * self.sectors_per_cluster()
    }

    /// Cluster heap start expressed in clusters; added to `(cluster - 2)`
    /// this yields absolute LCNs.
    pub fn heap_cluster_base(&self) -> u64 {
        self.cluster_heap_offset as u64 / self.sectors_per_cluster()
    }
}
