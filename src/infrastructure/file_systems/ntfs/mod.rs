//! NTFS deleted-file walker
//!
//! Walks the Master File Table directly: deleted files keep their MFT
//! record (name, data runs, resident data) until the record is reused.

mod boot;
mod record;
mod runs;
mod walker;

pub use boot::NtfsBootSector;
pub use record::{
    apply_fixups, best_file_name, has_file_signature, parent_reference, parse_mft_record,
    parse_mft_record_unchecked, read_mft_record, record_sequence_number, ParsedRecord,
    MFT_RECORD_FLAG_IN_USE,
};
pub use runs::parse_data_runs;
pub use walker::NtfsWalker;
