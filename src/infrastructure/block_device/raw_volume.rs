//! Drive-letter raw volume access for Windows.

use super::{MAPPING_GRANULARITY, MAX_MAPPING_SIZE};
use crate::domain::entities::FilesystemType;
use crate::domain::error::ForensicsError;
use crate::domain::repositories::BlockDevice;
use memmap2::{Mmap, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::AsRawHandle;
use std::sync::Mutex;
use windows_sys::Win32::Storage::FileSystem::{
    GetVolumeInformationW, FILE_SHARE_READ, FILE_SHARE_WRITE,
};
use windows_sys::Win32::System::Ioctl::{
    DISK_GEOMETRY, GET_LENGTH_INFORMATION, IOCTL_DISK_GET_DRIVE_GEOMETRY,
    IOCTL_DISK_GET_LENGTH_INFO,
};
use windows_sys::Win32::System::IO::DeviceIoControl;

/// Raw `\\.\X:` volume handle.
///
/// Opened with read+write sharing so scans coexist with whatever else
/// holds the volume; we never issue writes ourselves.
pub struct RawVolumeDevice {
    file: Mutex<File>,
    drive_letter: char,
    size: u64,
    sector_size: u64,
    mapping: Option<Mmap>,
    mapping_delta: usize,
}

impl RawVolumeDevice {
    pub fn open(drive_letter: char) -> Result<Self, ForensicsError> {
        let path = format!("\\\\.\\{}:", drive_letter.to_ascii_uppercase());
        let file = OpenOptions::new()
            .read(true)
            .share_mode(FILE_SHARE_READ | FILE_SHARE_WRITE)
            .open(&path)
            .map_err(|e| ForensicsError::DeviceOpen(format!("{}: {}", path, e)))?;

        let sector_size = query_sector_size(&file).unwrap_or(512);
        let size = query_length(&file)
            .or_else(|| query_geometry_size(&file))
            .unwrap_or(0);

        Ok(Self {
            file: Mutex::new(file),
            drive_letter,
            size,
            sector_size,
            mapping: None,
            mapping_delta: 0,
        })
    }

    pub fn drive_letter(&self) -> char {
        self.drive_letter
    }
}

impl BlockDevice for RawVolumeDevice {
    fn read_sectors(&self, start_sector: u64, count: u64, sector_size: u64) -> Vec<u8> {
        if count == 0 || sector_size == 0 {
            return Vec::new();
        }
        let offset = start_sector * sector_size;
        let wanted = (count * sector_size) as usize;
        let mut buffer = vec![0u8; wanted];

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        if file.seek(SeekFrom::Start(offset)).is_err() {
            return Vec::new();
        }

        // Raw volume reads must stay sector-granular; a short read past
        // the end of the volume is reported by truncation.
        match file.read(&mut buffer) {
            Ok(n) => {
                buffer.truncate(n);
                buffer
            }
            Err(_) => Vec::new(),
        }
    }

    fn sector_size(&self) -> u64 {
        self.sector_size
    }

    fn total_bytes(&self) -> u64 {
        self.size
    }

    fn map_region(&mut self, offset: u64, size: u64) -> Option<&[u8]> {
        if size == 0 || (self.size > 0 && offset >= self.size) {
            return None;
        }

        let aligned = (offset / MAPPING_GRANULARITY) * MAPPING_GRANULARITY;
        let delta = offset - aligned;
        let mut len = (size + delta).min(MAX_MAPPING_SIZE);
        if self.size > 0 {
            len = len.min(self.size - aligned);
        }
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

        self.mapping = Some(mmap);
        self.mapping_delta = delta as usize;
        self.mapping.as_ref().map(|m| &m[self.mapping_delta..])
    }
}

fn query_sector_size(file: &File) -> Option<u64> {
    let mut geometry: DISK_GEOMETRY = unsafe { std::mem::zeroed() };
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            IOCTL_DISK_GET_DRIVE_GEOMETRY,
            std::ptr::null(),
            0,
            &mut geometry as *mut _ as *mut _,
            std::mem::size_of::<DISK_GEOMETRY>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    (ok != 0 && geometry.BytesPerSector > 0).then_some(geometry.BytesPerSector as u64)
}

fn query_length(file: &File) -> Option<u64> {
    let mut info: GET_LENGTH_INFORMATION = unsafe { std::mem::zeroed() };
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            IOCTL_DISK_GET_LENGTH_INFO,
            std::ptr::null(),
            0,
            &mut info as *mut _ as *mut _,
            std::mem::size_of::<GET_LENGTH_INFORMATION>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    (ok != 0).then_some(info.Length as u64)
}

fn query_geometry_size(file: &File) -> Option<u64> {
    let mut geometry: DISK_GEOMETRY = unsafe { std::mem::zeroed() };
    let mut returned = 0u32;
    let ok = unsafe {
        DeviceIoControl(
            file.as_raw_handle() as _,
            IOCTL_DISK_GET_DRIVE_GEOMETRY,
            std::ptr::null(),
            0,
            &mut geometry as *mut _ as *mut _,
            std::mem::size_of::<DISK_GEOMETRY>() as u32,
            &mut returned,
            std::ptr::null_mut(),
        )
    };
    if ok == 0 {
        return None;
    }
    Some(
        geometry.Cylinders as u64
            * geometry.TracksPerCylinder as u64
            * geometry.SectorsPerTrack as u64
            * geometry.BytesPerSector as u64,
    )
}

/// Queries the mounted filesystem name for a drive letter.
pub fn query_volume_filesystem(drive_letter: char) -> FilesystemType {
    let root: Vec<u16> = format!("{}:\\", drive_letter.to_ascii_uppercase())
        .encode_utf16()
        .chain(std::iter::once(0))
        .collect();
    let mut fs_buf = [0u16; 64];
    let ok = unsafe {
        GetVolumeInformationW(
            root.as_ptr(),
            std::ptr::null_mut(),
            0,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            fs_buf.as_mut_ptr(),
            fs_buf.len() as u32,
        )
    };
    if ok == 0 {
        return FilesystemType::Unknown;
    }
    let end = fs_buf.iter().position(|&c| c == 0).unwrap_or(0);
    match String::from_utf16_lossy(&fs_buf[..end]).as_str() {
        "NTFS" => FilesystemType::Ntfs,
        "exFAT" => FilesystemType::ExFat,
        "FAT32" => FilesystemType::Fat32,
        _ => FilesystemType::Unknown,
    }
}
