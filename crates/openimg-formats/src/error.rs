//! Error types for IMG and COL format handling

use crate::img::ImgVersion;

/// Result type for format operations
pub type Result<T> = std::result::Result<T, FormatError>;

/// Errors raised while reading or writing container formats
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    /// The leading bytes match no known IMG signature
    #[error("unrecognized IMG signature: {0:02X?}")]
    UnknownSignature([u8; 4]),

    /// A V3 archive declared an unsupported format version
    #[error("unsupported V3 archive version: {0}")]
    UnsupportedV3Version(u32),

    /// Not enough bytes to hold the structure being read
    #[error("truncated {what}: needed {needed} bytes, had {available}")]
    Truncated {
        /// What was being read
        what: &'static str,
        /// Bytes required
        needed: usize,
        /// Bytes available
        available: usize,
    },

    /// A V1 archive was opened without its `.dir` directory sidecar
    #[error("V1 archive requires a .dir sidecar: {0}")]
    MissingSidecar(std::path::PathBuf),

    /// Writing this archive version is not supported
    #[error("writing {0} archives is not supported")]
    UnsupportedWrite(ImgVersion),

    /// Entry name is empty or exceeds the 23-character limit
    #[error("invalid entry name ({len} bytes): {name:?}")]
    InvalidName {
        /// The offending name
        name: String,
        /// Its length in bytes
        len: usize,
    },

    /// Entry too large to be addressed by this version's directory record
    #[error("entry {name:?} is too large for the directory record: {size} bytes")]
    EntryTooLarge {
        /// Entry name
        name: String,
        /// Entry size in bytes
        size: u64,
    },

    /// Binary decode/encode error
    #[error("binary format error: {0}")]
    Binary(#[from] binrw::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
