//! Per-format file-size probes.
//!
//! Each probe inspects a buffer that starts at the signature match and
//! answers "how long is this file according to its own header?". Only
//! formats with a reliable in-header or in-stream size indicator answer;
//! the rest return `None` and the carver emits nothing for them.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Dispatches to the probe for a catalog extension.
pub fn probe_size(extension: &str, data: &[u8]) -> Option<u64> {
    match extension {
        "png" => png_size(data),
        "jpg" => jpeg_size(data),
        "gif" => gif_size(data),
        "bmp" => bmp_size(data),
        "pdf" => pdf_size(data),
        "zip" | "docx" | "xlsx" | "pptx" => zip_size(data),
        "mp4" => mp4_size(data),
        "avi" | "wav" => riff_size(data),
        "doc" | "xls" | "ppt" => ole2_size(data),
        // RAR and 7z headers carry no usable total length; MKV and MP3
        // are unbounded streams.
        _ => None,
    }
}

/// PNG: chunk walk until IEND. Each chunk is length + type + data + CRC.
fn png_size(data: &[u8]) -> Option<u64> {
    const PNG_SIG: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    if data.len() < 8 || data[0..8] != PNG_SIG {
        return None;
    }

    let mut offset = 8usize;
    while offset + 12 <= data.len() {
        let chunk_len = BigEndian::read_u32(&data[offset..offset + 4]) as usize;
        if &data[offset + 4..offset + 8] == b"IEND" {
            return Some((offset + 12 + chunk_len) as u64);
        }
        if chunk_len > 10_000_000 {
            break;
        }
        offset += 12 + chunk_len;
    }
    None
}

/// JPEG: scan for the EOI marker (FF D9).
fn jpeg_size(data: &[u8]) -> Option<u64> {
    if data.len() < 3 || data[0] != 0xFF || data[1] != 0xD8 || data[2] != 0xFF {
        return None;
    }
    for i in 2..data.len().saturating_sub(1) {
        if data[i] == 0xFF && data[i + 1] == 0xD9 {
            return Some((i + 2) as u64);
        }
    }
    None
}

/// GIF: scan for the 0x3B trailer.
fn gif_size(data: &[u8]) -> Option<u64> {
    if data.len() < 6 || &data[0..4] != b"GIF8" {
        return None;
    }
    for (i, &b) in data.iter().enumerate().skip(6) {
        if b == 0x3B {
            return Some((i + 1) as u64);
        }
    }
    None
}

/// BMP: the header states the file size at offset 2.
fn bmp_size(data: &[u8]) -> Option<u64> {
    if data.len() < 6 || data[0] != 0x42 || data[1] != 0x4D {
        return None;
    }
    Some(LittleEndian::read_u32(&data[2..6]) as u64)
}

/// PDF: last `%%EOF` marker, searched from the tail.
fn pdf_size(data: &[u8]) -> Option<u64> {
    if data.len() < 9 || &data[0..4] != b"%PDF" {
        return None;
    }
    for i in (1..=data.len() - 5).rev() {
        if &data[i..i + 5] == b"%%EOF" {
            return Some((i + 5) as u64);
        }
    }
    None
}

/// ZIP and the OOXML family: end-of-central-directory record plus its
/// trailing comment.
fn zip_size(data: &[u8]) -> Option<u64> {
    if data.len() < 26 || data[0..4] != [0x50, 0x4B, 0x03, 0x04] {
        return None;
    }
    for i in (1..=data.len() - 22).rev() {
        if data[i..i + 4] == [0x50, 0x4B, 0x05, 0x06] {
            let comment_len = LittleEndian::read_u16(&data[i + 20..i + 22]) as u64;
            return Some(i as u64 + 22 + comment_len);
        }
    }
    None
}

/// MP4: sum top-level atom sizes until the data runs out.
fn mp4_size(data: &[u8]) -> Option<u64> {
    if data.len() < 8 || &data[4..8] != b"ftyp" {
        return None;
    }
    let mut total: u64 = 0;
    let mut offset = 0usize;
    while offset + 8 <= data.len() {
        let size = BigEndian::read_u32(&data[offset..offset + 4]) as u64;
        if size == 0 {
            break;
        }
        total += size;
        offset = match offset.checked_add(size as usize) {
            Some(next) => next,
            None => break,
        };
    }
    (total > 0).then_some(total)
}

/// RIFF containers (AVI, WAV): chunk size at offset 4 plus the 8-byte
/// header.
fn riff_size(data: &[u8]) -> Option<u64> {
    if data.len() < 12 || &data[0..4] != b"RIFF" {
        return None;
    }
    Some(LittleEndian::read_u32(&data[4..8]) as u64 + 8)
}

/// OLE2 compound files: sector count times sector size from the header.
fn ole2_size(data: &[u8]) -> Option<u64> {
    const OLE2_SIG: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
    if data.len() < 512 || data[0..8] != OLE2_SIG {
        return None;
    }
    let sector_shift = LittleEndian::read_u16(&data[30..32]);
    let sector_size = 1u64 << sector_shift.min(20);
    let total_sectors = LittleEndian::read_u32(&data[80..84]) as u64;
    (total_sectors > 0 && total_sectors < 1_000_000).then(|| total_sectors * sector_size)
}
