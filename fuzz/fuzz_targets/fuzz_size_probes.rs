#![no_main]

use exhume::infrastructure::carvers::probe_size;
use libfuzzer_sys::fuzz_target;

const EXTENSIONS: &[&str] = &[
    "png", "jpg", "gif", "bmp", "pdf", "zip", "mp4", "avi", "wav", "doc", "rar", "7z",
];

fuzz_target!(|data: &[u8]| {
    for ext in EXTENSIONS {
        if let Some(size) = probe_size(ext, data) {
            assert!(size > 0 || *ext == "bmp" || *ext == "avi" || *ext == "wav");
        }
    }
});
