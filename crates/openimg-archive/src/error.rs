//! Error types for archive operations

use openimg_formats::FormatError;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// Errors raised by the archive engine
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// Underlying container format error
    #[error(transparent)]
    Format(#[from] FormatError),

    /// The archive structure is damaged beyond what the readers tolerate
    #[error("archive is corrupted: {0}")]
    Corruption(String),

    /// No entry with the given name exists
    #[error("entry not found: {0:?}")]
    NotFound(String),

    /// Another operation is already running on this archive
    #[error("archive is busy with another operation")]
    Busy,

    /// The entry name cannot be stored in a directory record
    #[error("invalid entry name {name:?}: {reason}")]
    InvalidName {
        /// The offending name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// An entry's recorded payload range runs past the end of the file
    #[error("entry {name:?} payload ({offset}..{end}) exceeds archive length {file_len}")]
    PayloadOutOfBounds {
        /// Entry name
        name: String,
        /// Payload start offset
        offset: u64,
        /// Payload end offset
        end: u64,
        /// Archive file length
        file_len: u64,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
