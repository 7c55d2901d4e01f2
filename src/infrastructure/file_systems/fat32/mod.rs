//! FAT32 deleted-file walker
//!
//! Deleted entries keep their directory record (first byte overwritten
//! with the 0xE5 tombstone) but lose their FAT chain, so data is
//! reconstructed assuming contiguous allocation.

mod boot;
mod walker;

pub use boot::Fat32BootSector;
pub use walker::Fat32Walker;
