//! exFAT deleted-file walker
//!
//! Deletion clears an entry set's in-use bit and zeroes its FAT chain,
//! so deleted files are reconstructed assuming contiguous allocation
//! from their first cluster.

mod boot;
mod walker;

pub use boot::ExFatBootSector;
pub use walker::ExFatWalker;
