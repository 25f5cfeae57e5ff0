//! IMG archive directory formats
//!
//! Four on-disk layouts share the same logical model (a flat directory of
//! named, sector-addressed entries):
//!
//! ```text
//! V1         .img is pure payload; .dir sidecar holds 32-byte records
//! V2         "VER2" u32-count header, 32-byte records, payload follows
//! V3         0xA94E2A52 magic (GTA IV), 16-byte entries + name table
//! Fastman92  "VERF" extended header, 40-byte records with compression
//! ```
//!
//! All multi-byte fields are little-endian. V1/V2/Fastman92 address offsets
//! and sizes in 2048-byte sectors; V3 packs the size and flags into one
//! word.

mod read;
mod write;

pub use read::{read_directory, read_v1_directory};
pub use write::{data_start, directory_len, write_directory, write_v1_sidecar};

use crate::{SECTOR_SIZE, sectors_for};

/// V2 signature bytes
pub const V2_SIGNATURE: [u8; 4] = *b"VER2";

/// Fastman92 signature bytes
pub const FASTMAN92_SIGNATURE: [u8; 4] = *b"VERF";

/// V3 (GTA IV) header magic
pub const V3_MAGIC: u32 = 0xA94E_2A52;

/// Archive format version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImgVersion {
    /// GTA III / Vice City: `.img` payload + `.dir` sidecar
    V1,
    /// GTA San Andreas: embedded `VER2` directory
    V2,
    /// GTA IV: resource-typed entries, read-only here
    V3,
    /// Fastman92 extended format with compression metadata
    Fastman92,
    /// No recognized header. Headerless V1 archives detect as this too;
    /// only a `.dir` sidecar distinguishes them from garbage.
    Unknown,
}

impl ImgVersion {
    /// Detect the archive version from the leading header bytes.
    ///
    /// Fewer than 4 bytes, or 4 bytes matching no known signature, detect
    /// as [`ImgVersion::Unknown`]: V1 archives are headerless raw payload,
    /// so callers resolve `Unknown` to V1 by checking for the sidecar.
    pub fn detect(header: &[u8]) -> Self {
        let Some(sig) = header.get(..4) else {
            return Self::Unknown;
        };
        if sig == V2_SIGNATURE {
            Self::V2
        } else if sig == FASTMAN92_SIGNATURE {
            Self::Fastman92
        } else if u32::from_le_bytes([sig[0], sig[1], sig[2], sig[3]]) == V3_MAGIC {
            Self::V3
        } else {
            Self::Unknown
        }
    }

    /// Whether this version stores its directory inside the `.img` file
    pub fn has_embedded_directory(self) -> bool {
        matches!(self, Self::V2 | Self::V3 | Self::Fastman92)
    }

    /// Whether entries can be written back in this version
    pub fn is_writable(self) -> bool {
        matches!(self, Self::V1 | Self::V2 | Self::Fastman92)
    }
}

impl std::fmt::Display for ImgVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::V1 => "V1",
            Self::V2 => "V2",
            Self::V3 => "V3",
            Self::Fastman92 => "Fastman92",
            Self::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A directory entry as it appears on disk, with offsets and sizes already
/// converted to bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Entry name (up to 23 characters)
    pub name: String,
    /// Byte offset of the payload within the archive
    pub offset: u64,
    /// Payload size in bytes (sector-granular for V1/V2/Fastman92)
    pub size: u64,
    /// Uncompressed payload size in bytes (Fastman92 only; equals `size`
    /// elsewhere)
    pub uncompressed_size: u64,
    /// Whether the payload is stored compressed (Fastman92 flag bit 0)
    pub is_compressed: bool,
}

impl RawEntry {
    /// Plain uncompressed entry, the common case for V1/V2
    pub fn new(name: impl Into<String>, offset: u64, size: u64) -> Self {
        let name = name.into();
        Self {
            name,
            offset,
            size,
            uncompressed_size: size,
            is_compressed: false,
        }
    }

    /// Payload offset in sectors
    pub fn offset_sectors(&self) -> u64 {
        self.offset / SECTOR_SIZE
    }

    /// Payload size rounded up to whole sectors
    pub fn size_sectors(&self) -> u64 {
        sectors_for(self.size)
    }
}

/// A parsed archive directory
#[derive(Debug, Clone)]
pub struct Directory {
    /// Detected archive version
    pub version: ImgVersion,
    /// Entry count declared by the header (0 for V1, which has no header)
    pub declared_count: u32,
    /// Fastman92 internal format version (0 for other versions)
    pub format_version: u32,
    /// Entries actually read
    pub entries: Vec<RawEntry>,
    /// True when the directory declared more records than the file holds
    pub truncated: bool,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn detects_v2_signature() {
        assert_eq!(ImgVersion::detect(b"VER2\x05\x00\x00\x00"), ImgVersion::V2);
    }

    #[test]
    fn detects_fastman92_signature() {
        assert_eq!(ImgVersion::detect(b"VERF\x01\x00\x00\x00"), ImgVersion::Fastman92);
    }

    #[test]
    fn detects_v3_magic() {
        let mut header = [0u8; 8];
        header[..4].copy_from_slice(&V3_MAGIC.to_le_bytes());
        assert_eq!(ImgVersion::detect(&header), ImgVersion::V3);
    }

    #[test]
    fn unrecognized_bytes_detect_as_unknown() {
        assert_eq!(ImgVersion::detect(b"\x10\x00\x00\x00junk"), ImgVersion::Unknown);
        assert_eq!(ImgVersion::detect(b"VE"), ImgVersion::Unknown);
        assert_eq!(ImgVersion::detect(&[]), ImgVersion::Unknown);
        assert!(!ImgVersion::Unknown.is_writable());
        assert!(!ImgVersion::Unknown.has_embedded_directory());
    }

    #[test]
    fn raw_entry_sector_helpers() {
        let entry = RawEntry::new("a.dff", 4096, 3000);
        assert_eq!(entry.offset_sectors(), 2);
        assert_eq!(entry.size_sectors(), 2);
    }
}
