//! Domain entities

mod deleted_entry;
mod scan_config;
mod usn_record;

pub use deleted_entry::{
    format_file_size, merge_adjacent, CarvedHit, ClusterRange, DeletedEntry, FileLocation,
    FilesystemType,
};
pub use scan_config::ScanConfig;
pub use usn_record::{
    filetime_to_system_time, UsnRecord, FILE_ATTRIBUTE_DIRECTORY, USN_REASON_FILE_DELETE,
};
