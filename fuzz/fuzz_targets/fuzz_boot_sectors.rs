#![no_main]

use exhume::infrastructure::file_systems::exfat::ExFatBootSector;
use exhume::infrastructure::file_systems::fat32::Fat32BootSector;
use exhume::infrastructure::file_systems::ntfs::NtfsBootSector;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = NtfsBootSector::parse(data);
    let _ = ExFatBootSector::parse(data);
    let _ = Fat32BootSector::parse(data);
});
