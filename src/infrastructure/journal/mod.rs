//! NTFS change-journal access

mod usn;

pub use usn::UsnJournalReader;
