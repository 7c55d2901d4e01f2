//! Static catalog of file magic bytes.
//!
//! Several extensions legitimately share one magic: the OOXML family is
//! ZIP underneath and the legacy Office family is OLE2, so a match alone
//! cannot distinguish them. The carver keeps the first catalog entry that
//! both matches and size-validates.

use aho_corasick::AhoCorasick;

/// One catalog entry. `magic_offset` is the byte position of the magic
/// within the file (MP4's `ftyp` brand sits at offset 4, everything else
/// at 0).
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub extension: &'static str,
    pub magic: &'static [u8],
    pub magic_offset: usize,
    pub description: &'static str,
}

impl Signature {
    pub fn magic_len(&self) -> usize {
        self.magic.len()
    }

    /// Tests this signature at the start of `data`.
    pub fn matches(&self, data: &[u8]) -> bool {
        let end = self.magic_offset + self.magic.len();
        data.len() >= end && &data[self.magic_offset..end] == self.magic
    }
}

const PNG_MAGIC: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const GIF_MAGIC: &[u8] = b"GIF8";
const BMP_MAGIC: &[u8] = b"BM";
const PDF_MAGIC: &[u8] = b"%PDF";
const ZIP_MAGIC: &[u8] = &[0x50, 0x4B, 0x03, 0x04];
const OLE2_MAGIC: &[u8] = &[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
const MP4_MAGIC: &[u8] = b"ftyp";
const AVI_MAGIC: &[u8] = b"RIFF";
const MKV_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3];
const MP3_MAGIC: &[u8] = b"ID3";
const WAV_MAGIC: &[u8] = b"RIFF";
const RAR_MAGIC: &[u8] = &[0x52, 0x61, 0x72, 0x21, 0x1A, 0x07];
const SEVEN_ZIP_MAGIC: &[u8] = &[0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C];

const ALL_SIGNATURES: &[Signature] = &[
    Signature { extension: "png", magic: PNG_MAGIC, magic_offset: 0, description: "PNG image" },
    Signature { extension: "jpg", magic: JPEG_MAGIC, magic_offset: 0, description: "JPEG image" },
    Signature { extension: "gif", magic: GIF_MAGIC, magic_offset: 0, description: "GIF image" },
    Signature { extension: "bmp", magic: BMP_MAGIC, magic_offset: 0, description: "BMP image" },
    Signature { extension: "pdf", magic: PDF_MAGIC, magic_offset: 0, description: "PDF document" },
    Signature { extension: "zip", magic: ZIP_MAGIC, magic_offset: 0, description: "ZIP archive" },
    Signature { extension: "docx", magic: ZIP_MAGIC, magic_offset: 0, description: "Word document (DOCX)" },
    Signature { extension: "xlsx", magic: ZIP_MAGIC, magic_offset: 0, description: "Excel spreadsheet (XLSX)" },
    Signature { extension: "pptx", magic: ZIP_MAGIC, magic_offset: 0, description: "PowerPoint presentation (PPTX)" },
    Signature { extension: "doc", magic: OLE2_MAGIC, magic_offset: 0, description: "Word document (DOC)" },
    Signature { extension: "xls", magic: OLE2_MAGIC, magic_offset: 0, description: "Excel spreadsheet (XLS)" },
    Signature { extension: "ppt", magic: OLE2_MAGIC, magic_offset: 0, description: "PowerPoint presentation (PPT)" },
    Signature { extension: "mp4", magic: MP4_MAGIC, magic_offset: 4, description: "MP4 video" },
    Signature { extension: "avi", magic: AVI_MAGIC, magic_offset: 0, description: "AVI video" },
    Signature { extension: "mkv", magic: MKV_MAGIC, magic_offset: 0, description: "MKV video" },
    Signature { extension: "mp3", magic: MP3_MAGIC, magic_offset: 0, description: "MP3 audio" },
    Signature { extension: "wav", magic: WAV_MAGIC, magic_offset: 0, description: "WAV audio" },
    Signature { extension: "rar", magic: RAR_MAGIC, magic_offset: 0, description: "RAR archive" },
    Signature { extension: "7z", magic: SEVEN_ZIP_MAGIC, magic_offset: 0, description: "7-Zip archive" },
];

/// The closed signature set plus a prebuilt multi-pattern automaton.
pub struct SignatureCatalog {
    signatures: &'static [Signature],
    matcher: AhoCorasick,
}

impl SignatureCatalog {
    pub fn all() -> Self {
        let patterns: Vec<&[u8]> = ALL_SIGNATURES.iter().map(|s| s.magic).collect();
        let matcher = AhoCorasick::new(&patterns)
            .expect("static signature patterns always build");
        Self {
            signatures: ALL_SIGNATURES,
            matcher,
        }
    }

    pub fn signatures(&self) -> &'static [Signature] {
        self.signatures
    }

    /// Signatures whose magic matches at the start of `data`, in catalog
    /// order.
    pub fn matches_at(&self, data: &[u8]) -> impl Iterator<Item = &'static Signature> {
        let signatures: &'static [Signature] = self.signatures;
        let mut hits = [false; 64];
        // Anchored check per pattern keeps catalog order deterministic.
        for (idx, sig) in signatures.iter().enumerate() {
            hits[idx] = sig.matches(data);
        }
        signatures
            .iter()
            .enumerate()
            .filter(move |(idx, _)| hits[*idx])
            .map(|(_, sig)| sig)
    }

    /// Streams every magic occurrence in `data` as `(position, signature)`
    /// pairs, ascending by position. The position is where the magic
    /// bytes sit, not the file start; subtract `magic_offset` for that.
    pub fn find_magics<'a>(
        &'a self,
        data: &'a [u8],
    ) -> impl Iterator<Item = (usize, &'static Signature)> + 'a {
        let signatures: &'static [Signature] = self.signatures;
        self.matcher
            .find_overlapping_iter(data)
            .map(move |mat| (mat.start(), &signatures[mat.pattern().as_usize()]))
    }
}

impl Default for SignatureCatalog {
    fn default() -> Self {
        Self::all()
    }
}
