//! File-backed block device for disk images and POSIX raw devices.

use super::{MAPPING_GRANULARITY, MAX_MAPPING_SIZE};
use crate::domain::error::ForensicsError;
use crate::domain::repositories::BlockDevice;
use memmap2::{Mmap, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::Mutex;

/// Read-only handle over a disk image or raw device node.
///
/// Seeks are absolute, so the interior file handle only needs a mutex to
/// serialize seek+read pairs. At most one memory mapping is live; a new
/// `map_region` call replaces it.
pub struct FileBlockDevice {
    file: Mutex<File>,
    path: String,
    size: u64,
    sector_size: u64,
    mapping: Option<Mmap>,
    mapping_delta: usize,
}

impl FileBlockDevice {
    /// Opens `path` read-only with the default 512-byte sector size.
    pub fn open(path: &str) -> Result<Self, ForensicsError> {
        Self::open_with_sector_size(path, 512)
    }

    /// Opens `path` read-only, overriding the logical sector size (4 KiB
    /// native devices, for instance).
    pub fn open_with_sector_size(path: &str, sector_size: u64) -> Result<Self, ForensicsError> {
        let path_obj = Path::new(path);
        let file = OpenOptions::new().read(true).open(path_obj).map_err(|e| {
            ForensicsError::DeviceOpen(format!("{}: {}", path, e))
        })?;

        let size = Self::query_size(&file)
            .ok_or_else(|| ForensicsError::DeviceOpen(format!("{}: cannot determine size", path)))?;

        #[cfg(unix)]
        {
            // Scans are long sequential sweeps; tell the kernel so.
            let _ = rustix::fs::fadvise(&file, 0, None, rustix::fs::Advice::Sequential);
        }

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_string(),
            size,
            sector_size,
            mapping: None,
            mapping_delta: 0,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Regular files report their metadata length; device nodes report 0
    /// there, so fall back to seeking to the end.
    fn query_size(file: &File) -> Option<u64> {
        let metadata = file.metadata().ok()?;
        if metadata.is_file() && metadata.len() > 0 {
            return Some(metadata.len());
        }
        let mut probe = file.try_clone().ok()?;
        let size = probe.seek(SeekFrom::End(0)).ok()?;
        (size > 0).then_some(size)
    }
}

impl BlockDevice for FileBlockDevice {
    fn read_sectors(&self, start_sector: u64, count: u64, sector_size: u64) -> Vec<u8> {
        if count == 0 || sector_size == 0 {
            return Vec::new();
        }
        let offset = start_sector * sector_size;
        if offset >= self.size {
            return Vec::new();
        }

        let wanted = (count * sector_size).min(self.size - offset) as usize;
        let mut buffer = vec![0u8; wanted];

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        if file.seek(SeekFrom::Start(offset)).is_err() {
            return Vec::new();
        }

        let mut filled = 0;
        while filled < wanted {
            match file.read(&mut buffer[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(_) => return Vec::new(),
            }
        }
        buffer.truncate(filled);
        buffer
    }

    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    fn total_bytes(&self) -> u64 {
        self.size
    }

    fn map_region(&mut self, offset: u64, size: u64) -> Option<&[u8]> {
        if offset >= self.size || size == 0 {
            return None;
        }

        let aligned = (offset / MAPPING_GRANULARITY) * MAPPING_GRANULARITY;
        let delta = offset - aligned;
        let len = (size + delta)
            .min(MAX_MAPPING_SIZE)
            .min(self.size - aligned);
        if len <= delta {
            return None;
        }

        let mmap = {
            let file = self.file.lock().ok()?;
            unsafe {
                MmapOptions::new()
                    .offset(aligned)
                    .len(len as usize)
                    .map(&*file)
            }
            .ok()?
        };

        // The new mapping supersedes any previous one.
        self.mapping = Some(mmap);
        self.mapping_delta = delta as usize;
        self.mapping
            .as_ref()
            .map(|m| &m[self.mapping_delta..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn image_with(bytes: &[u8]) -> NamedTempFile {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(bytes).unwrap();
        tmp.flush().unwrap();
        tmp
    }

    #[test]
    fn read_sectors_is_absolute_and_truncating() {
        let tmp = image_with(&[0xA5u8; 1536]);
        let dev = FileBlockDevice::open(tmp.path().to_str().unwrap()).unwrap();
        assert_eq!(dev.total_bytes(), 1536);

        let full = dev.read_sectors(1, 1, 512);
        assert_eq!(full.len(), 512);
        assert!(full.iter().all(|&b| b == 0xA5));

        // Device runs short: result truncated, not errored.
        let short = dev.read_sectors(2, 4, 512);
        assert_eq!(short.len(), 512);

        // Past the end: empty buffer signals failure.
        assert!(dev.read_sectors(10, 1, 512).is_empty());
    }

    #[test]
    fn mapping_adjusts_back_to_requested_offset() {
        let mut data = vec![0u8; 128 * 1024];
        data[70_000] = 0xEE;
        let tmp = image_with(&data);
        let mut dev = FileBlockDevice::open(tmp.path().to_str().unwrap()).unwrap();

        let view = dev.map_region(70_000, 1024).unwrap();
        assert_eq!(view[0], 0xEE);
    }

    #[test]
    fn new_mapping_supersedes_previous() {
        let tmp = image_with(&vec![7u8; 256 * 1024]);
        let mut dev = FileBlockDevice::open(tmp.path().to_str().unwrap()).unwrap();
        let first_len = dev.map_region(0, 4096).map(|v| v.len()).unwrap();
        assert!(first_len >= 4096);
        let second = dev.map_region(128 * 1024, 4096).unwrap();
        assert_eq!(second[0], 7);
    }
}
