//! Binary format support for GTA game-asset containers
//!
//! This crate provides stateless readers and writers for the IMG archive
//! family (V1 sidecar, V2, V3/GTA IV, Fastman92) and a streaming parser for
//! COL collision containers (versions 1-4). It knows nothing about archive
//! mutation or validation policy; see `openimg-archive` for the stateful
//! engine built on top.
//!
//! # Supported Formats
//!
//! - **IMG V1**: headerless `.img` data file + `.dir` directory sidecar
//!   (GTA III / Vice City)
//! - **IMG V2**: `VER2` header with embedded directory (San Andreas)
//! - **IMG V3**: `0xA94E2A52` magic, resource-typed entries (GTA IV,
//!   read-only)
//! - **Fastman92**: `VERF` header, extended records with compression
//!   metadata
//! - **COL 1-4**: concatenated collision models with per-model FourCC and
//!   declared content size

#![warn(missing_docs)]

pub mod col;
pub mod error;
pub mod img;
pub mod rw;

pub use error::{FormatError, Result};

/// IMG archives address and pad data in 2048-byte sectors.
pub const SECTOR_SIZE: u64 = 2048;

/// Maximum entry name length in characters, excluding the NUL terminator.
pub const MAX_NAME_LEN: usize = 23;

/// On-disk size of the fixed name field in V1/V2/Fastman92 records.
pub const NAME_FIELD_LEN: usize = 24;

/// Number of sectors needed to hold `bytes` bytes.
pub fn sectors_for(bytes: u64) -> u64 {
    bytes.div_ceil(SECTOR_SIZE)
}

/// Round `bytes` up to the next sector boundary.
pub fn align_to_sector(bytes: u64) -> u64 {
    sectors_for(bytes) * SECTOR_SIZE
}

/// Decode a fixed-width NUL-padded name field.
///
/// Everything from the first NUL onward is discarded; non-ASCII bytes are
/// replaced rather than rejected, since shipped archives contain the odd
/// high byte in never-referenced padding.
pub fn decode_name(field: &[u8]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// Encode a name into a fixed 24-byte NUL-padded field.
///
/// Fails if the name is empty or longer than [`MAX_NAME_LEN`] bytes.
pub fn encode_name(name: &str) -> Result<[u8; NAME_FIELD_LEN]> {
    let bytes = name.as_bytes();
    if bytes.is_empty() || bytes.len() > MAX_NAME_LEN {
        return Err(FormatError::InvalidName {
            name: name.to_string(),
            len: bytes.len(),
        });
    }
    let mut field = [0u8; NAME_FIELD_LEN];
    field[..bytes.len()].copy_from_slice(bytes);
    Ok(field)
}
