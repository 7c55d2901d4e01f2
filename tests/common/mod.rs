//! Shared builders for synthetic disk images.
//!
//! Images are plain byte vectors written to temp files and opened
//! through `FileBlockDevice`, so every test exercises the same sector
//! paths a raw device would.

#![allow(dead_code)]

use exhume::infrastructure::block_device::FileBlockDevice;
use std::io::Write;
use tempfile::NamedTempFile;

pub const SECTOR_SIZE: u64 = 512;
pub const SECTORS_PER_CLUSTER: u64 = 8;
pub const BYTES_PER_CLUSTER: u64 = SECTOR_SIZE * SECTORS_PER_CLUSTER;
pub const MFT_RECORD_SIZE: usize = 1024;

/// Writes an image to a temp file and opens it as a block device.
pub fn open_image(bytes: &[u8]) -> (NamedTempFile, FileBlockDevice) {
    let mut tmp = NamedTempFile::new().expect("temp image");
    tmp.write_all(bytes).expect("write image");
    tmp.flush().expect("flush image");
    let device = FileBlockDevice::open(tmp.path().to_str().unwrap()).expect("open image");
    (tmp, device)
}

// ---------------------------------------------------------------------------
// NTFS
// ---------------------------------------------------------------------------

pub const NTFS_MFT_CLUSTER: u64 = 4;

/// Grows a synthetic NTFS volume: boot sector, MFT at cluster 4, and
/// arbitrary cluster payloads.
pub struct NtfsImage {
    pub bytes: Vec<u8>,
}

impl NtfsImage {
    pub fn new(total_clusters: u64) -> Self {
        let mut bytes = vec![0u8; (total_clusters * BYTES_PER_CLUSTER) as usize];
        bytes[3..11].copy_from_slice(b"NTFS    ");
        bytes[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        bytes[13] = SECTORS_PER_CLUSTER as u8;
        bytes[40..48].copy_from_slice(&(total_clusters * SECTORS_PER_CLUSTER).to_le_bytes());
        bytes[48..56].copy_from_slice(&NTFS_MFT_CLUSTER.to_le_bytes());
        bytes[64] = 0xF6; // -10: 1 KiB MFT records
        Self { bytes }
    }

    pub fn mft_offset(&self) -> usize {
        (NTFS_MFT_CLUSTER * BYTES_PER_CLUSTER) as usize
    }

    /// Places a fully built MFT record at the given index.
    pub fn put_record(&mut self, index: u64, record: &[u8]) {
        assert_eq!(record.len(), MFT_RECORD_SIZE);
        let at = self.mft_offset() + index as usize * MFT_RECORD_SIZE;
        self.bytes[at..at + MFT_RECORD_SIZE].copy_from_slice(record);
    }

    /// Writes payload bytes at an absolute LCN.
    pub fn put_cluster_data(&mut self, lcn: u64, data: &[u8]) {
        let at = (lcn * BYTES_PER_CLUSTER) as usize;
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }
}

/// Incrementally composes one 1 KiB MFT file record, then installs the
/// update sequence array the same way the format does on disk.
pub struct MftRecordBuilder {
    record: Vec<u8>,
    attr_cursor: usize,
}

pub const FLAG_IN_USE: u16 = 0x0001;
pub const FLAG_IS_DIRECTORY: u16 = 0x0002;

impl MftRecordBuilder {
    /// `flags`: 0 = deleted file, 0x01 in use, 0x02 directory.
    pub fn new(sequence: u16, flags: u16) -> Self {
        let mut record = vec![0u8; MFT_RECORD_SIZE];
        record[0..4].copy_from_slice(b"FILE");
        record[4..6].copy_from_slice(&48u16.to_le_bytes()); // USA offset
        record[6..8].copy_from_slice(&3u16.to_le_bytes()); // USA count (2 sectors)
        record[16..18].copy_from_slice(&sequence.to_le_bytes());
        record[20..22].copy_from_slice(&56u16.to_le_bytes()); // first attribute
        record[22..24].copy_from_slice(&flags.to_le_bytes());
        Self {
            record,
            attr_cursor: 56,
        }
    }

    fn push_attr(&mut self, attr: &[u8]) -> &mut Self {
        let end = self.attr_cursor + attr.len();
        assert!(end + 8 <= MFT_RECORD_SIZE, "record overflow");
        self.record[self.attr_cursor..end].copy_from_slice(attr);
        self.attr_cursor = end;
        self
    }

    pub fn file_name(&mut self, parent_mft: u64, name: &str, name_type: u8) -> &mut Self {
        let units: Vec<u16> = name.encode_utf16().collect();
        let value_len = 66 + units.len() * 2;
        let attr_len = (24 + value_len + 7) / 8 * 8;

        let mut attr = vec![0u8; attr_len];
        attr[0..4].copy_from_slice(&0x30u32.to_le_bytes());
        attr[4..8].copy_from_slice(&(attr_len as u32).to_le_bytes());
        attr[8] = 0; // resident
        attr[16..20].copy_from_slice(&(value_len as u32).to_le_bytes());
        attr[20..22].copy_from_slice(&24u16.to_le_bytes());

        let v = 24;
        attr[v..v + 8].copy_from_slice(&parent_mft.to_le_bytes());
        attr[v + 64] = units.len() as u8;
        attr[v + 65] = name_type;
        for (i, unit) in units.iter().enumerate() {
            attr[v + 66 + i * 2..v + 68 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        self.push_attr(&attr)
    }

    pub fn resident_data(&mut self, data: &[u8]) -> &mut Self {
        let attr_len = (24 + data.len() + 7) / 8 * 8;
        let mut attr = vec![0u8; attr_len];
        attr[0..4].copy_from_slice(&0x80u32.to_le_bytes());
        attr[4..8].copy_from_slice(&(attr_len as u32).to_le_bytes());
        attr[8] = 0;
        attr[16..20].copy_from_slice(&(data.len() as u32).to_le_bytes());
        attr[20..22].copy_from_slice(&24u16.to_le_bytes());
        attr[24..24 + data.len()].copy_from_slice(data);
        self.push_attr(&attr)
    }

    pub fn nonresident_data(&mut self, runs: &[u8], real_size: u64) -> &mut Self {
        let attr_len = (64 + runs.len() + 7) / 8 * 8;
        let mut attr = vec![0u8; attr_len];
        attr[0..4].copy_from_slice(&0x80u32.to_le_bytes());
        attr[4..8].copy_from_slice(&(attr_len as u32).to_le_bytes());
        attr[8] = 1; // non-resident
        attr[32..34].copy_from_slice(&64u16.to_le_bytes()); // run list offset
        attr[48..56].copy_from_slice(&real_size.to_le_bytes());
        attr[64..64 + runs.len()].copy_from_slice(runs);
        self.push_attr(&attr)
    }

    /// Non-resident `$DATA` named `$J` (the change journal stream).
    pub fn journal_data(&mut self, runs: &[u8], real_size: u64) -> &mut Self {
        let runs_at = 72;
        let attr_len = (runs_at + runs.len() + 7) / 8 * 8;
        let mut attr = vec![0u8; attr_len];
        attr[0..4].copy_from_slice(&0x80u32.to_le_bytes());
        attr[4..8].copy_from_slice(&(attr_len as u32).to_le_bytes());
        attr[8] = 1;
        attr[9] = 2; // name length in characters
        attr[10..12].copy_from_slice(&64u16.to_le_bytes()); // name offset
        attr[32..34].copy_from_slice(&(runs_at as u16).to_le_bytes());
        attr[48..56].copy_from_slice(&real_size.to_le_bytes());
        attr[64..66].copy_from_slice(&(b'$' as u16).to_le_bytes());
        attr[66..68].copy_from_slice(&(b'J' as u16).to_le_bytes());
        attr[runs_at..runs_at + runs.len()].copy_from_slice(runs);
        self.push_attr(&attr)
    }

    /// Terminates the attribute list and installs fixups: the real tail
    /// words move into the USA and the sentinel takes their place.
    pub fn build(&mut self) -> Vec<u8> {
        let end = self.attr_cursor;
        self.record[end..end + 4].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());

        let mut record = self.record.clone();
        let sentinel: u16 = 0x5A5A;
        record[48..50].copy_from_slice(&sentinel.to_le_bytes());
        for i in 1..3usize {
            let tail = i * SECTOR_SIZE as usize;
            let usa = 48 + i * 2;
            record.copy_within(tail - 2..tail, usa);
            record[tail - 2..tail].copy_from_slice(&sentinel.to_le_bytes());
        }
        record
    }
}

/// Encodes a run list from `(lcn, count)` pairs using 4-byte fields.
pub fn encode_runs(runs: &[(u64, u64)]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut previous: i64 = 0;
    for &(lcn, count) in runs {
        let delta = lcn as i64 - previous;
        out.push(0x44); // 4 length bytes, 4 offset bytes
        out.extend_from_slice(&(count as u32).to_le_bytes());
        out.extend_from_slice(&(delta as i32).to_le_bytes());
        previous = lcn as i64;
    }
    out.push(0x00);
    out
}

/// Encodes one `USN_RECORD_V2`, 8-byte aligned.
pub fn encode_usn_record(
    mft_index: u64,
    sequence: u16,
    reason: u32,
    attributes: u32,
    filename: &str,
) -> Vec<u8> {
    let units: Vec<u16> = filename.encode_utf16().collect();
    let name_bytes = units.len() * 2;
    let record_length = (60 + name_bytes + 7) / 8 * 8;

    let mut rec = vec![0u8; record_length];
    rec[0..4].copy_from_slice(&(record_length as u32).to_le_bytes());
    rec[4..6].copy_from_slice(&2u16.to_le_bytes());
    rec[8..16].copy_from_slice(&((sequence as u64) << 48 | mft_index).to_le_bytes());
    rec[16..24].copy_from_slice(&5u64.to_le_bytes());
    rec[32..40].copy_from_slice(&116_444_736_000_000_000u64.to_le_bytes());
    rec[40..44].copy_from_slice(&reason.to_le_bytes());
    rec[52..56].copy_from_slice(&attributes.to_le_bytes());
    rec[56..58].copy_from_slice(&(name_bytes as u16).to_le_bytes());
    rec[58..60].copy_from_slice(&60u16.to_le_bytes());
    for (i, unit) in units.iter().enumerate() {
        rec[60 + i * 2..62 + i * 2].copy_from_slice(&unit.to_le_bytes());
    }
    rec
}

pub const USN_REASON_FILE_DELETE: u32 = 0x0000_0200;

// ---------------------------------------------------------------------------
// exFAT
// ---------------------------------------------------------------------------

/// Synthetic exFAT volume. Geometry: 512-byte sectors, 8 sectors per
/// cluster, FAT at sector 24, configurable cluster-heap offset.
pub struct ExFatImage {
    pub bytes: Vec<u8>,
    pub heap_offset_sectors: u64,
}

pub const EXFAT_FAT_OFFSET: u64 = 24;
pub const EXFAT_ROOT_CLUSTER: u32 = 4;

impl ExFatImage {
    pub fn new(total_bytes: usize, heap_offset_sectors: u64) -> Self {
        let mut bytes = vec![0u8; total_bytes];
        bytes[3..11].copy_from_slice(b"EXFAT   ");
        bytes[80..84].copy_from_slice(&(EXFAT_FAT_OFFSET as u32).to_le_bytes());
        bytes[84..88].copy_from_slice(&32u32.to_le_bytes());
        bytes[88..92].copy_from_slice(&(heap_offset_sectors as u32).to_le_bytes());
        bytes[96..100].copy_from_slice(&EXFAT_ROOT_CLUSTER.to_le_bytes());
        bytes[108] = 9; // 512-byte sectors
        bytes[109] = 3; // 8 sectors per cluster
        Self {
            bytes,
            heap_offset_sectors,
        }
    }

    /// Marks a cluster's FAT entry.
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        let at = (EXFAT_FAT_OFFSET * SECTOR_SIZE) as usize + cluster as usize * 4;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    /// Byte offset of a heap cluster.
    pub fn cluster_offset(&self, cluster: u32) -> usize {
        ((self.heap_offset_sectors + (cluster as u64 - 2) * SECTORS_PER_CLUSTER) * SECTOR_SIZE)
            as usize
    }

    pub fn put_cluster_data(&mut self, cluster: u32, data: &[u8]) {
        let at = self.cluster_offset(cluster);
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }
}

/// Builds an exFAT file entry set (file + stream + name entries).
/// `deleted` clears the in-use bit on every entry of the set.
pub fn exfat_entry_set(
    name: &str,
    first_cluster: u32,
    data_length: u64,
    is_dir: bool,
    deleted: bool,
) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let name_entries = units.len().div_ceil(15);
    let secondary_count = 1 + name_entries;
    let in_use = if deleted { 0x00 } else { 0x80 };

    let mut out = Vec::new();

    let mut file = vec![0u8; 32];
    file[0] = 0x05 | in_use;
    file[1] = secondary_count as u8;
    let attrs: u16 = if is_dir { 0x10 } else { 0x20 };
    file[4..6].copy_from_slice(&attrs.to_le_bytes());
    out.extend_from_slice(&file);

    let mut stream = vec![0u8; 32];
    stream[0] = 0x40 | in_use;
    stream[3] = units.len() as u8;
    stream[20..24].copy_from_slice(&first_cluster.to_le_bytes());
    stream[24..32].copy_from_slice(&data_length.to_le_bytes());
    out.extend_from_slice(&stream);

    for chunk in units.chunks(15) {
        let mut entry = vec![0u8; 32];
        entry[0] = 0x41 | in_use;
        for (i, unit) in chunk.iter().enumerate() {
            entry[2 + i * 2..4 + i * 2].copy_from_slice(&unit.to_le_bytes());
        }
        out.extend_from_slice(&entry);
    }
    out
}

// ---------------------------------------------------------------------------
// FAT32
// ---------------------------------------------------------------------------

pub const FAT32_RESERVED: u16 = 32;
pub const FAT32_FAT_SIZE: u32 = 8;
pub const FAT32_ROOT_CLUSTER: u32 = 2;

/// Synthetic FAT32 volume: 512-byte sectors, 8 sectors per cluster,
/// data area at sector 48.
pub struct Fat32Image {
    pub bytes: Vec<u8>,
}

impl Fat32Image {
    pub fn new(total_bytes: usize) -> Self {
        let mut bytes = vec![0u8; total_bytes];
        bytes[11..13].copy_from_slice(&(SECTOR_SIZE as u16).to_le_bytes());
        bytes[13] = SECTORS_PER_CLUSTER as u8;
        bytes[14..16].copy_from_slice(&FAT32_RESERVED.to_le_bytes());
        bytes[16] = 2;
        bytes[36..40].copy_from_slice(&FAT32_FAT_SIZE.to_le_bytes());
        bytes[44..48].copy_from_slice(&FAT32_ROOT_CLUSTER.to_le_bytes());
        bytes[510..512].copy_from_slice(&0xAA55u16.to_le_bytes());
        Self { bytes }
    }

    pub fn data_start_sector(&self) -> u64 {
        FAT32_RESERVED as u64 + 2 * FAT32_FAT_SIZE as u64
    }

    pub fn cluster_offset(&self, cluster: u32) -> usize {
        ((self.data_start_sector() + (cluster as u64 - 2) * SECTORS_PER_CLUSTER) * SECTOR_SIZE)
            as usize
    }

    pub fn put_cluster_data(&mut self, cluster: u32, data: &[u8]) {
        let at = self.cluster_offset(cluster);
        self.bytes[at..at + data.len()].copy_from_slice(data);
    }
}

/// Builds one 8.3 directory entry. A deleted entry's first name byte is
/// overwritten with the 0xE5 tombstone.
pub fn fat32_short_entry(
    short_name: &[u8; 11],
    attr: u8,
    cluster: u32,
    file_size: u32,
    deleted: bool,
) -> Vec<u8> {
    let mut entry = vec![0u8; 32];
    entry[0..11].copy_from_slice(short_name);
    if deleted {
        entry[0] = 0xE5;
    }
    entry[11] = attr;
    entry[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    entry[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    entry[28..32].copy_from_slice(&file_size.to_le_bytes());
    entry
}

/// Builds the LFN entries for `name` in on-disk (reverse) order.
/// `deleted` overwrites each sequence byte with 0xE5.
pub fn fat32_lfn_entries(name: &str, checksum: u8, deleted: bool) -> Vec<u8> {
    let units: Vec<u16> = name.encode_utf16().collect();
    let chunk_count = units.len().div_ceil(13);
    let mut out = Vec::new();

    for chunk_idx in (0..chunk_count).rev() {
        let mut entry = vec![0u8; 32];
        let seq = (chunk_idx + 1) as u8;
        entry[0] = if chunk_idx == chunk_count - 1 {
            seq | 0x40
        } else {
            seq
        };
        if deleted {
            entry[0] = 0xE5;
        }
        entry[11] = 0x0F;
        entry[13] = checksum;

        let start = chunk_idx * 13;
        let slice_bounds: [(usize, usize, usize); 3] = [(1, 0, 5), (14, 5, 6), (28, 11, 2)];
        for (at, rel, count) in slice_bounds {
            for k in 0..count {
                let idx = start + rel + k;
                let unit = match idx.cmp(&units.len()) {
                    std::cmp::Ordering::Less => units[idx],
                    std::cmp::Ordering::Equal => 0x0000,
                    std::cmp::Ordering::Greater => 0xFFFF,
                };
                entry[at + k * 2..at + k * 2 + 2].copy_from_slice(&unit.to_le_bytes());
            }
        }
        out.extend_from_slice(&entry);
    }
    out
}

// ---------------------------------------------------------------------------
// Carving payloads
// ---------------------------------------------------------------------------

/// A valid PNG whose IEND chunk starts at `iend_offset`.
pub fn minimal_png(iend_offset: usize) -> Vec<u8> {
    assert!(iend_offset >= 20);
    let idat_len = iend_offset - 8 - 12;
    let mut png = vec![0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    let mut idat = vec![0u8; 12 + idat_len];
    idat[0..4].copy_from_slice(&(idat_len as u32).to_be_bytes());
    idat[4..8].copy_from_slice(b"IDAT");
    for (i, byte) in idat.iter_mut().enumerate().skip(8).take(idat_len) {
        *byte = (i % 251) as u8;
    }
    png.extend_from_slice(&idat);
    let mut iend = vec![0u8; 12];
    iend[4..8].copy_from_slice(b"IEND");
    iend[8..12].copy_from_slice(&[0xAE, 0x42, 0x60, 0x82]);
    png.extend_from_slice(&iend);
    png
}
