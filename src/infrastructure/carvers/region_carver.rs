//! Cluster-region signature carving.

use super::sizes::probe_size;
use crate::domain::entities::CarvedHit;
use crate::domain::repositories::BlockDevice;
use crate::domain::services::{Signature, SignatureCatalog};
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::collections::BTreeMap;
use tracing::debug;

/// Header bytes handed to a size probe per hit.
pub const HEADER_READ_SIZE: usize = 256 * 1024;

/// Clusters of header data the cluster-wise fallback reads per probe.
const HEADER_READ_CLUSTERS: u64 = 64;

/// Ceiling on the skip applied after a validated hit, so one absurd
/// header cannot jump the scan over the rest of the region.
pub const MAX_SAFE_SKIP: u64 = 256 * 1024 * 1024;

/// Cluster gap above which a size mismatch counts as severe
/// fragmentation.
const MAX_REASONABLE_GAP: u64 = 16;

/// Carving statistics accumulated by the diagnostic scan.
#[derive(Debug, Default, Clone)]
pub struct CarveStats {
    pub total_signatures_found: u64,
    pub by_format: BTreeMap<&'static str, u64>,
    pub files_with_known_size: u64,
    pub files_with_validated_size: u64,
    pub unknown_size: u64,
    pub potentially_fragmented: u64,
    pub fragmented_by_format: BTreeMap<&'static str, u64>,
    pub severely_fragmented: u64,
}

#[derive(Debug, Default)]
pub struct DiagnosticResult {
    pub files: Vec<CarvedHit>,
    pub stats: CarveStats,
}

struct SizeValidation {
    has_size: bool,
    expected_size: u64,
    actual_size: u64,
    is_valid: bool,
}

/// Scans cluster regions for file signatures and size-validates each hit.
///
/// The carver assumes contiguous layout after a signature hit; heavily
/// fragmented files are out of its reach by design.
pub struct RegionCarver {
    catalog: SignatureCatalog,
}

impl RegionCarver {
    pub fn new(catalog: SignatureCatalog) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &SignatureCatalog {
        &self.catalog
    }

    /// Scans `cluster_count` clusters starting at `start_cluster`.
    ///
    /// The region is mapped zero-copy when the device supports it and
    /// bulk-read otherwise. Hits are returned in ascending cluster order,
    /// capped at `max_files`.
    #[allow(clippy::too_many_arguments)]
    pub fn scan_region(
        &self,
        device: &mut dyn BlockDevice,
        start_cluster: u64,
        cluster_count: u64,
        sectors_per_cluster: u64,
        cluster_heap_offset: u64,
        sector_size: u64,
        max_files: u64,
    ) -> Vec<CarvedHit> {
        if cluster_count == 0 || start_cluster < 2 {
            return Vec::new();
        }

        let bytes_per_cluster = sectors_per_cluster * sector_size;
        let start_offset =
            (cluster_heap_offset + (start_cluster - 2) * sectors_per_cluster) * sector_size;
        let region_size = cluster_count * bytes_per_cluster;

        if let Some(data) = device.map_region(start_offset, region_size) {
            // The mapped view may exceed the requested region; clamp so
            // batches never overlap.
            let data = &data[..data.len().min(region_size as usize)];
            return self.scan_buffer(data, start_cluster, bytes_per_cluster, max_files);
        }

        debug!(start_offset, region_size, "mapping failed, bulk read fallback");
        let sectors_to_read = region_size.div_ceil(sector_size);
        let buffer = device.read_sectors(start_offset / sector_size, sectors_to_read, sector_size);
        if buffer.is_empty() {
            return Vec::new();
        }
        self.scan_buffer(&buffer, start_cluster, bytes_per_cluster, max_files)
    }

    /// `scan_region` plus fragmentation statistics.
    #[allow(clippy::too_many_arguments)]
    pub fn scan_region_with_diagnostics(
        &self,
        device: &mut dyn BlockDevice,
        start_cluster: u64,
        cluster_count: u64,
        sectors_per_cluster: u64,
        cluster_heap_offset: u64,
        sector_size: u64,
        max_files: u64,
    ) -> DiagnosticResult {
        let mut result = DiagnosticResult::default();
        if cluster_count == 0 || start_cluster < 2 {
            return result;
        }

        let bytes_per_cluster = sectors_per_cluster * sector_size;
        let start_offset =
            (cluster_heap_offset + (start_cluster - 2) * sectors_per_cluster) * sector_size;
        let region_size = cluster_count * bytes_per_cluster;

        if let Some(data) = device.map_region(start_offset, region_size) {
            let data = &data[..data.len().min(region_size as usize)];
            self.scan_buffer_diagnostic(
                data,
                start_cluster,
                bytes_per_cluster,
                max_files,
                &mut result,
            );
            return result;
        }

        let sectors_to_read = region_size.div_ceil(sector_size);
        let buffer = device.read_sectors(start_offset / sector_size, sectors_to_read, sector_size);
        if !buffer.is_empty() {
            self.scan_buffer_diagnostic(
                &buffer,
                start_cluster,
                bytes_per_cluster,
                max_files,
                &mut result,
            );
        }
        result
    }

    /// Legacy cluster-wise probe: checks one cluster's head for any
    /// catalog magic via sector reads, no mapping involved.
    pub fn scan_cluster_for_signature(
        &self,
        device: &dyn BlockDevice,
        cluster: u64,
        sectors_per_cluster: u64,
        cluster_heap_offset: u64,
        sector_size: u64,
    ) -> Option<&'static Signature> {
        if cluster < 2 {
            return None;
        }
        let sector = cluster_heap_offset + (cluster - 2) * sectors_per_cluster;
        let data = device.read_sectors(sector, sectors_per_cluster, sector_size);
        if data.is_empty() {
            return None;
        }
        self.catalog.matches_at(&data).next()
    }

    /// Legacy cluster-wise size parse: reads header clusters and probes.
    pub fn parse_file_size(
        &self,
        device: &dyn BlockDevice,
        cluster: u64,
        sectors_per_cluster: u64,
        cluster_heap_offset: u64,
        sector_size: u64,
        signature: &Signature,
    ) -> Option<u64> {
        let sector = cluster_heap_offset + (cluster - 2) * sectors_per_cluster;
        let data = device.read_sectors(
            sector,
            sectors_per_cluster * HEADER_READ_CLUSTERS,
            sector_size,
        );
        if data.is_empty() {
            return None;
        }
        probe_size(signature.extension, &data)
    }

    fn scan_buffer(
        &self,
        data: &[u8],
        start_cluster: u64,
        bytes_per_cluster: u64,
        max_files: u64,
    ) -> Vec<CarvedHit> {
        let mut hits: Vec<CarvedHit> = Vec::new();
        let mut cursor: usize = 0;

        for (pos, sig) in self.catalog.find_magics(data) {
            if hits.len() as u64 >= max_files {
                break;
            }
            let Some(file_start) = pos.checked_sub(sig.magic_offset) else {
                continue;
            };
            if file_start < cursor || file_start as u64 % bytes_per_cluster != 0 {
                continue;
            }

            let header_end = (file_start + HEADER_READ_SIZE).min(data.len());
            let Some(file_size) = probe_size(sig.extension, &data[file_start..header_end]) else {
                continue;
            };
            if file_size == 0 {
                continue;
            }

            hits.push(CarvedHit {
                extension: sig.extension,
                description: sig.description,
                start_cluster: start_cluster + file_start as u64 / bytes_per_cluster,
                file_size,
            });

            let safe_skip = file_size.min(MAX_SAFE_SKIP);
            let aligned_skip = safe_skip.div_ceil(bytes_per_cluster) * bytes_per_cluster;
            cursor = file_start.saturating_add(aligned_skip as usize);
        }
        hits
    }

    fn scan_buffer_diagnostic(
        &self,
        data: &[u8],
        start_cluster: u64,
        bytes_per_cluster: u64,
        max_files: u64,
        result: &mut DiagnosticResult,
    ) {
        let mut cursor: usize = 0;

        for (pos, sig) in self.catalog.find_magics(data) {
            if result.files.len() as u64 >= max_files {
                break;
            }
            let Some(file_start) = pos.checked_sub(sig.magic_offset) else {
                continue;
            };
            if file_start < cursor || file_start as u64 % bytes_per_cluster != 0 {
                continue;
            }

            result.stats.total_signatures_found += 1;
            *result.stats.by_format.entry(sig.extension).or_insert(0) += 1;

            let header_end = (file_start + HEADER_READ_SIZE).min(data.len());
            let header = &data[file_start..header_end];

            let validation = validate_file_size(header, sig);
            if validation.has_size {
                result.stats.files_with_known_size += 1;
                let gap = validation
                    .actual_size
                    .saturating_sub(validation.expected_size)
                    / bytes_per_cluster;
                if gap > 1 {
                    result.stats.potentially_fragmented += 1;
                    *result
                        .stats
                        .fragmented_by_format
                        .entry(sig.extension)
                        .or_insert(0) += 1;
                    if gap > MAX_REASONABLE_GAP {
                        result.stats.severely_fragmented += 1;
                    }
                }
                if validation.is_valid {
                    result.stats.files_with_validated_size += 1;
                }
            } else {
                result.stats.unknown_size += 1;
            }

            let Some(file_size) = probe_size(sig.extension, header) else {
                continue;
            };
            if file_size == 0 {
                continue;
            }

            result.files.push(CarvedHit {
                extension: sig.extension,
                description: sig.description,
                start_cluster: start_cluster + file_start as u64 / bytes_per_cluster,
                file_size,
            });

            let safe_skip = file_size.min(MAX_SAFE_SKIP);
            let aligned_skip = safe_skip.div_ceil(bytes_per_cluster) * bytes_per_cluster;
            cursor = file_start.saturating_add(aligned_skip as usize);
        }
    }
}

impl Default for RegionCarver {
    fn default() -> Self {
        Self::new(SignatureCatalog::all())
    }
}

/// Header-declared size check for the formats that state one: PNG chunk
/// walk, BMP header field, RIFF chunk size. Everything else reports
/// `has_size = false`.
fn validate_file_size(header: &[u8], sig: &Signature) -> SizeValidation {
    let mut v = SizeValidation {
        has_size: false,
        expected_size: 0,
        actual_size: 0,
        is_valid: false,
    };
    if header.len() < 64 {
        return v;
    }

    match sig.extension {
        "png" => {
            v.has_size = true;
            let mut offset = 8usize;
            while offset + 12 <= header.len() {
                let chunk_len = BigEndian::read_u32(&header[offset..offset + 4]) as usize;
                if &header[offset + 4..offset + 8] == b"IEND" {
                    v.actual_size = (offset + 12 + chunk_len) as u64;
                    v.expected_size = v.actual_size;
                    v.is_valid = true;
                    break;
                }
                if chunk_len > 10_000_000 {
                    break;
                }
                offset += 12 + chunk_len;
            }
        }
        "bmp" => {
            v.has_size = true;
            v.expected_size = LittleEndian::read_u32(&header[2..6]) as u64;
            v.actual_size = v.expected_size;
            v.is_valid = v.expected_size > 54 && v.expected_size < 1_000_000_000;
        }
        "wav" | "avi" if &header[0..4] == b"RIFF" => {
            v.has_size = true;
            v.expected_size = LittleEndian::read_u32(&header[4..8]) as u64 + 8;
            v.actual_size = v.expected_size;
            v.is_valid = v.expected_size > 44 && v.expected_size < 10_000_000_000;
        }
        _ => {}
    }
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repositories::BlockDevice;

    /// In-memory device: a plain byte image with no mapping support, so
    /// the bulk-read fallback is exercised too.
    struct MemDevice {
        data: Vec<u8>,
        allow_mapping: bool,
        mapping: Vec<u8>,
    }

    impl MemDevice {
        fn new(data: Vec<u8>, allow_mapping: bool) -> Self {
            Self {
                data,
                allow_mapping,
                mapping: Vec::new(),
            }
        }
    }

    impl BlockDevice for MemDevice {
        fn read_sectors(&self, start_sector: u64, count: u64, sector_size: u64) -> Vec<u8> {
            let offset = (start_sector * sector_size) as usize;
            if offset >= self.data.len() {
                return Vec::new();
            }
            let end = (offset + (count * sector_size) as usize).min(self.data.len());
            self.data[offset..end].to_vec()
        }

        fn sector_size(&self) -> u64 {
            512
        }

        fn total_bytes(&self) -> u64 {
            self.data.len() as u64
        }

        fn map_region(&mut self, offset: u64, size: u64) -> Option<&[u8]> {
            if !self.allow_mapping {
                return None;
            }
            let start = offset as usize;
            if start >= self.data.len() {
                return None;
            }
            let end = (start + size as usize).min(self.data.len());
            self.mapping = self.data[start..end].to_vec();
            Some(&self.mapping)
        }
    }

    fn image_with_png(total: usize, png_at: usize) -> Vec<u8> {
        let mut image = vec![0u8; total];
        let png = crate::infrastructure::carvers::sizes::tests::minimal_png(8_200);
        image[png_at..png_at + png.len()].copy_from_slice(&png);
        image
    }

    #[test]
    fn carves_png_from_mapped_region() {
        // PNG at cluster 10 of a heap starting at sector 0.
        let bpc = 4_096usize;
        let image = image_with_png(64 * bpc, 8 * bpc);
        let mut device = MemDevice::new(image, true);
        let carver = RegionCarver::default();

        let hits = carver.scan_region(&mut device, 2, 64, 8, 0, 512, 100);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].extension, "png");
        assert_eq!(hits[0].start_cluster, 10);
        assert_eq!(hits[0].file_size, 8_212);
    }

    #[test]
    fn fallback_read_matches_mapped_scan() {
        let bpc = 4_096usize;
        let image = image_with_png(64 * bpc, 8 * bpc);
        let mut mapped = MemDevice::new(image.clone(), true);
        let mut unmapped = MemDevice::new(image, false);
        let carver = RegionCarver::default();

        let a = carver.scan_region(&mut mapped, 2, 64, 8, 0, 512, 100);
        let b = carver.scan_region(&mut unmapped, 2, 64, 8, 0, 512, 100);
        assert_eq!(a.len(), b.len());
        assert_eq!(a[0].start_cluster, b[0].start_cluster);
        assert_eq!(a[0].file_size, b[0].file_size);
    }

    #[test]
    fn skip_is_cluster_aligned_past_each_hit() {
        let bpc = 4_096usize;
        let mut image = vec![0u8; 64 * bpc];
        let png = crate::infrastructure::carvers::sizes::tests::minimal_png(8_200);
        image[0..png.len()].copy_from_slice(&png);
        // A second PNG inside the first one's span must be skipped; a
        // third past it must be found.
        image[bpc..bpc + 8].copy_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);
        let second = crate::infrastructure::carvers::sizes::tests::minimal_png(1_000);
        image[16 * bpc..16 * bpc + second.len()].copy_from_slice(&second);

        let mut device = MemDevice::new(image, true);
        let carver = RegionCarver::default();
        let hits = carver.scan_region(&mut device, 2, 64, 8, 0, 512, 100);

        let clusters: Vec<u64> = hits.iter().map(|h| h.start_cluster).collect();
        assert_eq!(clusters, vec![2, 18]);
    }

    #[test]
    fn max_files_budget_is_honored() {
        let bpc = 4_096usize;
        let mut image = vec![0u8; 32 * bpc];
        for i in 0..4 {
            let png = crate::infrastructure::carvers::sizes::tests::minimal_png(100);
            let at = i * 4 * bpc;
            image[at..at + png.len()].copy_from_slice(&png);
        }
        let mut device = MemDevice::new(image, true);
        let carver = RegionCarver::default();
        assert_eq!(carver.scan_region(&mut device, 2, 32, 8, 0, 512, 2).len(), 2);
    }

    #[test]
    fn diagnostics_count_signatures() {
        let bpc = 4_096usize;
        let image = image_with_png(64 * bpc, 0);
        let mut device = MemDevice::new(image, true);
        let carver = RegionCarver::default();

        let result = carver.scan_region_with_diagnostics(&mut device, 2, 64, 8, 0, 512, 100);
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.stats.total_signatures_found, 1);
        assert_eq!(result.stats.by_format.get("png"), Some(&1));
        assert_eq!(result.stats.files_with_known_size, 1);
        assert_eq!(result.stats.files_with_validated_size, 1);
        assert_eq!(result.stats.severely_fragmented, 0);
    }
}
