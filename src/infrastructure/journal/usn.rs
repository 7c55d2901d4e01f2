//! `$UsnJrnl:$J` reader.
//!
//! The journal is the `$J` named data stream of `$Extend\$UsnJrnl`,
//! conventionally MFT record 38 on Windows-formatted volumes. Deletion
//! events in it reference MFT records by index + sequence number, which
//! lets Stage 2 find files whose MFT entries were missed or reused.

use crate::domain::entities::{
    filetime_to_system_time, ClusterRange, ScanConfig, UsnRecord,
};
use crate::domain::error::{ForensicsError, Result};
use crate::domain::repositories::BlockDevice;
use crate::infrastructure::file_systems::ntfs::{
    has_file_signature, read_mft_record, NtfsBootSector,
};
use byteorder::{ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use tracing::debug;

/// `$Extend\$UsnJrnl` by filesystem convention.
const USNJRNL_RECORD_NUMBER: u64 = 38;

const ATTR_DATA: u32 = 0x80;
const ATTR_END: u32 = 0xFFFF_FFFF;

/// Minimum and maximum plausible `USN_RECORD_V2` lengths.
const MIN_RECORD_LENGTH: u32 = 60;
const MAX_RECORD_LENGTH: u32 = 65_536;

pub struct UsnJournalReader;

impl UsnJournalReader {
    pub fn new() -> Self {
        Self
    }

    /// Parses the journal and groups deletion-relevant records by MFT
    /// index, capped at `config.usn_record_limit` records total.
    pub fn parse_journal(
        &self,
        device: &dyn BlockDevice,
        boot: &NtfsBootSector,
        config: &ScanConfig,
    ) -> Result<BTreeMap<u64, Vec<UsnRecord>>> {
        let jrnl_record = read_mft_record(device, boot, USNJRNL_RECORD_NUMBER);
        if jrnl_record.is_empty() {
            return Err(ForensicsError::JournalAbsent);
        }

        let ranges = locate_j_stream(&jrnl_record).ok_or(ForensicsError::JournalAbsent)?;
        debug!(runs = ranges.len(), "located $J stream");

        let data = read_clusters(device, boot, &ranges, config.usn_cluster_read_limit);
        if data.is_empty() {
            return Err(ForensicsError::JournalAbsent);
        }

        let mut by_mft: BTreeMap<u64, Vec<UsnRecord>> = BTreeMap::new();
        let mut count: u64 = 0;
        for record in decode_records(&data) {
            if count >= config.usn_record_limit {
                break;
            }
            by_mft.entry(record.mft_index()).or_default().push(record);
            count += 1;
        }
        Ok(by_mft)
    }
}

impl Default for UsnJournalReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds the non-resident `$DATA` attribute named `$J` in the `$UsnJrnl`
/// MFT record and decodes its run list.
fn locate_j_stream(record: &[u8]) -> Option<Vec<ClusterRange>> {
    if record.len() < 48 || !has_file_signature(record) {
        return None;
    }

    let mut offset = LittleEndian::read_u16(&record[20..22]) as usize;
    while offset + 16 <= record.len() {
        let attr_type = LittleEndian::read_u32(&record[offset..offset + 4]);
        if attr_type == ATTR_END {
            break;
        }
        let attr_len = LittleEndian::read_u32(&record[offset + 4..offset + 8]) as usize;
        if attr_len == 0 || offset + attr_len > record.len() {
            break;
        }

        if attr_type == ATTR_DATA {
            let name_length = record[offset + 9] as usize;
            let name_offset = LittleEndian::read_u16(&record[offset + 10..offset + 12]) as usize;
            if name_length > 0 && offset + name_offset + name_length * 2 <= record.len() {
                let units: Vec<u16> = record
                    [offset + name_offset..offset + name_offset + name_length * 2]
                    .chunks_exact(2)
                    .map(LittleEndian::read_u16)
                    .collect();
                if String::from_utf16_lossy(&units) == "$J" {
                    return parse_attribute_runs(&record[offset..offset + attr_len]);
                }
            }
        }
        offset += attr_len;
    }
    None
}

/// Decodes the run list of a non-resident attribute slice.
fn parse_attribute_runs(attr: &[u8]) -> Option<Vec<ClusterRange>> {
    if attr.len() < 64 || attr[8] == 0 {
        return None; // resident attributes carry no runs
    }
    let run_offset = LittleEndian::read_u16(&attr[32..34]) as usize;
    if run_offset >= attr.len() {
        return None;
    }

    let mut ranges: Vec<ClusterRange> = Vec::new();
    let run_data = &attr[run_offset..];
    let mut offset = 0usize;
    let mut current_lcn: i64 = 0;

    while offset < run_data.len() {
        let header = run_data[offset];
        if header == 0 {
            break;
        }
        let length_bytes = (header & 0x0F) as usize;
        let offset_bytes = ((header >> 4) & 0x0F) as usize;
        if length_bytes == 0 || length_bytes > 8 || offset_bytes > 8 {
            break;
        }
        offset += 1;
        if offset + length_bytes + offset_bytes > run_data.len() {
            break;
        }

        let mut run_length: u64 = 0;
        for i in 0..length_bytes {
            run_length |= (run_data[offset + i] as u64) << (i * 8);
        }
        offset += length_bytes;

        let mut lcn_delta: i64 = 0;
        for i in 0..offset_bytes {
            lcn_delta |= (run_data[offset + i] as i64) << (i * 8);
        }
        if offset_bytes > 0 && run_data[offset + offset_bytes - 1] & 0x80 != 0 {
            for i in offset_bytes..8 {
                lcn_delta |= 0xFFi64 << (i * 8);
            }
        }
        offset += offset_bytes;

        current_lcn += lcn_delta;
        if offset_bytes > 0 && current_lcn > 0 {
            ranges.push(ClusterRange::new(current_lcn as u64, run_length));
        }
        if ranges.len() > 10_000 {
            break;
        }
    }

    (!ranges.is_empty()).then_some(ranges)
}

/// Reads the journal ranges in order, stopping at the cluster cap.
fn read_clusters(
    device: &dyn BlockDevice,
    boot: &NtfsBootSector,
    ranges: &[ClusterRange],
    cluster_cap: u64,
) -> Vec<u8> {
    let sector_size = boot.bytes_per_sector as u64;
    let sectors_per_cluster = boot.sectors_per_cluster as u64;
    let mut result = Vec::new();
    let mut clusters_read: u64 = 0;

    for range in ranges {
        if clusters_read >= cluster_cap {
            break;
        }
        let to_read = range.count.min(cluster_cap - clusters_read);
        for i in 0..to_read {
            let sector = (range.start_lcn + i) * sectors_per_cluster;
            let data = device.read_sectors(sector, sectors_per_cluster, sector_size);
            result.extend_from_slice(&data);
            clusters_read += 1;
        }
    }
    result
}

/// Decodes `USN_RECORD_V2` entries from the raw stream.
///
/// A record that fails the length sanity check advances the cursor by 8
/// bytes to resynchronize; valid records advance by their own length,
/// then align to 8 bytes.
fn decode_records(buffer: &[u8]) -> Vec<UsnRecord> {
    let mut records = Vec::new();
    let mut offset = 0usize;

    while offset + 60 < buffer.len() {
        let record_length = LittleEndian::read_u32(&buffer[offset..offset + 4]);
        if record_length < MIN_RECORD_LENGTH
            || record_length > MAX_RECORD_LENGTH
            || offset + record_length as usize > buffer.len()
        {
            offset += 8;
            continue;
        }

        let rec = &buffer[offset..offset + record_length as usize];
        let filename_length = LittleEndian::read_u16(&rec[56..58]) as usize;
        let filename_offset = LittleEndian::read_u16(&rec[58..60]) as usize;

        let filename = if filename_offset > 0
            && filename_length > 0
            && filename_offset + filename_length <= rec.len()
        {
            let units: Vec<u16> = rec[filename_offset..filename_offset + filename_length]
                .chunks_exact(2)
                .map(LittleEndian::read_u16)
                .collect();
            String::from_utf16_lossy(&units)
        } else {
            String::new()
        };

        records.push(UsnRecord {
            record_length,
            major_version: LittleEndian::read_u16(&rec[4..6]),
            minor_version: LittleEndian::read_u16(&rec[6..8]),
            file_reference_number: LittleEndian::read_u64(&rec[8..16]),
            parent_file_reference_number: LittleEndian::read_u64(&rec[16..24]),
            usn: LittleEndian::read_i64(&rec[24..32]),
            timestamp: filetime_to_system_time(LittleEndian::read_u64(&rec[32..40])),
            reason: LittleEndian::read_u32(&rec[40..44]),
            source_info: LittleEndian::read_u32(&rec[44..48]),
            security_id: LittleEndian::read_u32(&rec[48..52]),
            file_attributes: LittleEndian::read_u32(&rec[52..56]),
            filename,
        });

        offset += record_length as usize;
        offset = (offset + 7) & !7usize;
    }

    records
}
