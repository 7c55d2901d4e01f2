//! MFT file-record parsing: fixups, attribute walk, name and data
//! extraction.

use super::boot::NtfsBootSector;
use super::runs::parse_data_runs;
use crate::domain::entities::FileLocation;
use crate::domain::repositories::BlockDevice;
use byteorder::{ByteOrder, LittleEndian};

pub const MFT_RECORD_FLAG_IN_USE: u16 = 0x0001;
pub const MFT_RECORD_FLAG_IS_DIRECTORY: u16 = 0x0002;

const ATTR_FILE_NAME: u32 = 0x30;
const ATTR_DATA: u32 = 0x80;
const ATTR_END: u32 = 0xFFFF_FFFF;

const NAME_TYPE_WIN32: u8 = 0x01;
const NAME_TYPE_DOS: u8 = 0x02;
const NAME_TYPE_WIN32_DOS: u8 = 0x03;

/// Restores the bytes the update sequence array replaced at each sector
/// boundary.
///
/// Records already patched (or media written without fixups) carry
/// mismatched sentinels; those sectors are left untouched.
pub fn apply_fixups(record: &mut [u8], bytes_per_sector: u16) -> bool {
    if record.len() < 42 {
        return false;
    }
    let usa_offset = LittleEndian::read_u16(&record[4..6]) as usize;
    let usa_count = LittleEndian::read_u16(&record[6..8]) as usize;
    if usa_offset + usa_count * 2 > record.len() {
        return false;
    }

    let usn = LittleEndian::read_u16(&record[usa_offset..usa_offset + 2]);
    for i in 1..usa_count {
        let sector_end = i * bytes_per_sector as usize;
        if sector_end < 2 || sector_end > record.len() {
            break;
        }
        let footer = LittleEndian::read_u16(&record[sector_end - 2..sector_end]);
        if footer == usn {
            let patch = LittleEndian::read_u16(&record[usa_offset + i * 2..usa_offset + i * 2 + 2]);
            LittleEndian::write_u16(&mut record[sector_end - 2..sector_end], patch);
        }
    }
    true
}

/// Reads one MFT record by index and applies fixups.
///
/// Returns an empty buffer on read failure.
pub fn read_mft_record(
    device: &dyn BlockDevice,
    boot: &NtfsBootSector,
    record_num: u64,
) -> Vec<u8> {
    let sector_size = boot.bytes_per_sector as u64;
    let record_size = boot.mft_record_size();
    let record_offset = boot.mft_offset() + record_num * record_size;

    let start_sector = record_offset / sector_size;
    let num_sectors = record_size.div_ceil(sector_size);

    let data = device.read_sectors(start_sector, num_sectors, sector_size);
    if data.is_empty() {
        return Vec::new();
    }

    let offset_in_sector = (record_offset % sector_size) as usize;
    if offset_in_sector >= data.len() {
        return Vec::new();
    }
    let end = (offset_in_sector + record_size as usize).min(data.len());
    let mut record = data[offset_in_sector..end].to_vec();

    apply_fixups(&mut record, boot.bytes_per_sector);
    record
}

/// True when the buffer starts with a `FILE` record header.
pub fn has_file_signature(record: &[u8]) -> bool {
    record.len() >= 4 && &record[0..4] == b"FILE"
}

/// Record sequence number (reused-slot detector for USN correlation).
pub fn record_sequence_number(record: &[u8]) -> u16 {
    if record.len() < 18 {
        return 0;
    }
    LittleEndian::read_u16(&record[16..18])
}

/// Name, size and data location extracted from one deleted file record.
#[derive(Debug, Default)]
pub struct ParsedRecord {
    pub name: String,
    pub size: u64,
    pub location: FileLocation,
    pub has_data: bool,
}

/// Parses a (fixed-up) MFT record into a deleted-file candidate.
///
/// Returns `None` for records that are in use, directories, unnamed, or
/// not `FILE` records at all. Attribute walking is clamped to the record
/// bounds throughout; a malformed attribute ends the walk.
pub fn parse_mft_record(record: &[u8], boot: &NtfsBootSector) -> Option<ParsedRecord> {
    if record.len() < 24 || !has_file_signature(record) {
        return None;
    }
    let flags = LittleEndian::read_u16(&record[22..24]);
    if flags & MFT_RECORD_FLAG_IN_USE != 0 {
        return None;
    }
    parse_mft_record_unchecked(record, boot)
}

/// `parse_mft_record` without the in-use check.
///
/// USN correlation confirms deletion through the journal's sequence
/// number, so a matching record is parsed even when its in-use bit was
/// left set. Directories are still skipped.
pub fn parse_mft_record_unchecked(record: &[u8], boot: &NtfsBootSector) -> Option<ParsedRecord> {
    if record.len() < 24 || !has_file_signature(record) {
        return None;
    }

    let flags = LittleEndian::read_u16(&record[22..24]);
    if flags & MFT_RECORD_FLAG_IS_DIRECTORY != 0 {
        return None;
    }

    let mut parsed = ParsedRecord::default();
    let mut has_name = false;

    for (offset, attr_type, attr_len) in AttributeWalker::new(record) {
        match attr_type {
            ATTR_FILE_NAME if !has_name => {
                if let Some(name) = parse_file_name_value(record, offset, attr_len) {
                    parsed.name = name;
                    has_name = true;
                }
            }
            ATTR_DATA if !parsed.has_data => {
                let non_resident = record[offset + 8];
                if non_resident == 0 {
                    if let Some(bytes) = resident_value(record, offset) {
                        parsed.size = bytes.len() as u64;
                        parsed.location = FileLocation::Resident(bytes.to_vec());
                        parsed.has_data = true;
                    }
                } else if attr_len >= 64 {
                    let run_offset = LittleEndian::read_u16(&record[offset + 32..offset + 34]) as usize;
                    let real_size = LittleEndian::read_u64(&record[offset + 48..offset + 56]);
                    if run_offset < attr_len && offset + attr_len <= record.len() {
                        let runs = &record[offset + run_offset..offset + attr_len];
                        let ranges = parse_data_runs(runs, boot.bytes_per_cluster());
                        parsed.size = real_size;
                        parsed.location = FileLocation::Ranges(ranges);
                        parsed.has_data = true;
                    }
                }
            }
            _ => {}
        }
    }

    has_name.then_some(parsed)
}

/// Parent MFT index referenced by this record's `$FILE_NAME` attributes.
///
/// Win32 names win, then Win32/DOS combined, then DOS as a last resort.
pub fn parent_reference(record: &[u8]) -> Option<u64> {
    if !has_file_signature(record) {
        return None;
    }

    let mut parent: Option<u64> = None;
    for (offset, attr_type, attr_len) in AttributeWalker::new(record) {
        if attr_type != ATTR_FILE_NAME || attr_len < 22 || record[offset + 8] != 0 {
            continue;
        }
        let value_offset = LittleEndian::read_u16(&record[offset + 20..offset + 22]) as usize;
        let value = offset + value_offset;
        if value + 66 > record.len() || value_offset >= attr_len {
            continue;
        }
        let reference = LittleEndian::read_u64(&record[value..value + 8]) & 0x0000_FFFF_FFFF_FFFF;
        match record[value + 65] {
            NAME_TYPE_WIN32 => return Some(reference),
            NAME_TYPE_WIN32_DOS => parent = Some(reference),
            NAME_TYPE_DOS if parent.is_none() => parent = Some(reference),
            _ => {}
        }
    }
    parent
}

/// Best name carried by a record's `$FILE_NAME` attributes: Win32 first,
/// then the combined Win32/DOS namespace, POSIX, and DOS last.
pub fn best_file_name(record: &[u8]) -> Option<String> {
    if !has_file_signature(record) {
        return None;
    }

    let mut best: Option<(u8, String)> = None;
    for (offset, attr_type, attr_len) in AttributeWalker::new(record) {
        if attr_type != ATTR_FILE_NAME || attr_len < 22 || record[offset + 8] != 0 {
            continue;
        }
        let value_offset = LittleEndian::read_u16(&record[offset + 20..offset + 22]) as usize;
        if value_offset >= attr_len {
            continue;
        }
        let value = offset + value_offset;
        if value + 66 > record.len() {
            continue;
        }
        let name_type = record[value + 65];
        let rank = match name_type {
            NAME_TYPE_WIN32 => 0,
            NAME_TYPE_WIN32_DOS => 1,
            0x00 => 2, // POSIX namespace
            _ => 3,
        };
        if best.as_ref().is_some_and(|(r, _)| *r <= rank) {
            continue;
        }
        let name_length = (record[value + 64] as usize).min(255);
        let name_end = match (value + 66).checked_add(name_length * 2) {
            Some(end) if end <= record.len() => end,
            _ => continue,
        };
        let units: Vec<u16> = record[value + 66..name_end]
            .chunks_exact(2)
            .map(LittleEndian::read_u16)
            .collect();
        best = Some((rank, String::from_utf16_lossy(&units)));
        if rank == 0 {
            break;
        }
    }
    best.map(|(_, name)| name)
}

/// Iterates `(attribute_offset, type, length)` from the first attribute,
/// stopping on the end marker, zero length, or record bounds.
struct AttributeWalker<'a> {
    record: &'a [u8],
    offset: usize,
}

impl<'a> AttributeWalker<'a> {
    fn new(record: &'a [u8]) -> Self {
        let first = if record.len() >= 22 {
            LittleEndian::read_u16(&record[20..22]) as usize
        } else {
            record.len()
        };
        Self {
            record,
            offset: first,
        }
    }
}

impl Iterator for AttributeWalker<'_> {
    type Item = (usize, u32, usize);

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset + 16 > self.record.len() {
            return None;
        }
        let attr_type = LittleEndian::read_u32(&self.record[self.offset..self.offset + 4]);
        if attr_type == ATTR_END {
            return None;
        }
        let attr_len =
            LittleEndian::read_u32(&self.record[self.offset + 4..self.offset + 8]) as usize;
        if attr_len == 0 || self.offset + attr_len > self.record.len() {
            return None;
        }
        let item = (self.offset, attr_type, attr_len);
        self.offset += attr_len;
        Some(item)
    }
}

/// Value bytes of a resident attribute, bounds-checked.
fn resident_value(record: &[u8], attr_offset: usize) -> Option<&[u8]> {
    if attr_offset + 22 > record.len() {
        return None;
    }
    let value_length = LittleEndian::read_u32(&record[attr_offset + 16..attr_offset + 20]) as usize;
    let value_offset = LittleEndian::read_u16(&record[attr_offset + 20..attr_offset + 22]) as usize;
    let start = attr_offset + value_offset;
    let end = start.checked_add(value_length)?;
    (end <= record.len()).then(|| &record[start..end])
}

/// Decodes a resident `$FILE_NAME` value, skipping DOS 8.3 entries.
fn parse_file_name_value(record: &[u8], attr_offset: usize, attr_len: usize) -> Option<String> {
    if attr_len < 22 || record[attr_offset + 8] != 0 {
        return None; // $FILE_NAME is always resident on valid volumes
    }
    let value_offset = LittleEndian::read_u16(&record[attr_offset + 20..attr_offset + 22]) as usize;
    if value_offset >= attr_len {
        return None;
    }
    let value = attr_offset + value_offset;
    if value + 66 > record.len() {
        return None;
    }

    let name_type = record[value + 65];
    if name_type == NAME_TYPE_DOS {
        return None;
    }

    let name_length = (record[value + 64] as usize).min(255);
    let name_start = value + 66;
    let name_end = name_start.checked_add(name_length * 2)?;
    if name_end > record.len() {
        return None;
    }

    let units: Vec<u16> = record[name_start..name_end]
        .chunks_exact(2)
        .map(LittleEndian::read_u16)
        .collect();
    Some(String::from_utf16_lossy(&units))
}
