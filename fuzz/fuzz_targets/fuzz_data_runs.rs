#![no_main]

use exhume::infrastructure::file_systems::ntfs::parse_data_runs;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let ranges = parse_data_runs(data, 4096);
    // Decoded ranges must be merged: adjacent neighbours never touch.
    for pair in ranges.windows(2) {
        assert_ne!(pair[0].start_lcn + pair[0].count, pair[1].start_lcn);
    }
});
