//! Error taxonomy shared by every component.
//!
//! Walkers swallow `RecordCorrupt` and `ReadFailed` locally and keep
//! scanning; a single bad record must never abort a scan. `BadBootSector`
//! aborts the current walker, `JournalAbsent` aborts only the USN stage,
//! and writer errors abort the current file only.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Cannot open raw volume: {0}")]
    DeviceOpen(String),

    #[error("Invalid boot sector: {0}")]
    BadBootSector(String),

    #[error("Sector read failed at LBA {0}")]
    ReadFailed(u64),

    #[error("Corrupt record: {0}")]
    RecordCorrupt(String),

    #[error("Metadata found but data location lost for {0}")]
    LocationLost(String),

    #[error("Destination resolves to the source volume: {0}")]
    DestinationIsSource(String),

    #[error("Invalid destination path: {0}")]
    InvalidDestination(String),

    #[error("$UsnJrnl:$J is not present on this volume")]
    JournalAbsent,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
