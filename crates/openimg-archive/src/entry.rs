//! Directory entries as seen by the engine

use openimg_formats::img::RawEntry;
use openimg_formats::{SECTOR_SIZE, align_to_sector, sectors_for};

/// Coarse classification of an entry by extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileKind {
    /// DFF model
    Model,
    /// TXD texture dictionary
    Texture,
    /// COL collision container
    Collision,
    /// IFP animation package
    Animation,
    /// WAV audio
    Audio,
    /// SCM script
    Script,
    /// Anything else
    Other,
}

impl FileKind {
    /// Classify by file extension, case-insensitively
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "dff" => Self::Model,
            "txd" => Self::Texture,
            "col" => Self::Collision,
            "ifp" => Self::Animation,
            "wav" => Self::Audio,
            "scm" => Self::Script,
            _ => Self::Other,
        }
    }
}

/// One archive entry.
///
/// `offset` and `size` describe the payload currently on disk; for entries
/// added or replaced since the last rebuild they are provisional (the next
/// rebuild assigns real offsets) and the payload lives in `pending_data`.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Entry name, at most 23 characters
    pub name: String,
    /// Payload byte offset in the archive
    pub offset: u64,
    /// Payload size in bytes
    pub size: u64,
    /// Uncompressed size (differs from `size` only for compressed
    /// Fastman92 entries)
    pub uncompressed_size: u64,
    /// Whether the on-disk payload is compressed (Fastman92)
    pub is_compressed: bool,
    /// Added since the last rebuild
    pub is_new: bool,
    /// Replaced since the last rebuild
    pub is_replaced: bool,
    /// Payload bytes awaiting the next rebuild
    pub(crate) pending_data: Option<Vec<u8>>,
}

impl Entry {
    /// Entry backed by payload already on disk
    pub(crate) fn existing(raw: &RawEntry) -> Self {
        Self {
            name: raw.name.clone(),
            offset: raw.offset,
            size: raw.size,
            uncompressed_size: raw.uncompressed_size,
            is_compressed: raw.is_compressed,
            is_new: false,
            is_replaced: false,
            pending_data: None,
        }
    }

    /// Entry created in memory, awaiting its first rebuild
    pub(crate) fn pending(name: String, data: Vec<u8>) -> Self {
        let size = data.len() as u64;
        Self {
            name,
            offset: 0,
            size,
            uncompressed_size: size,
            is_compressed: false,
            is_new: true,
            is_replaced: false,
            pending_data: Some(data),
        }
    }

    /// File extension without the dot, lowercased; empty when absent
    pub fn extension(&self) -> String {
        self.name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Coarse file classification
    pub fn kind(&self) -> FileKind {
        FileKind::from_extension(&self.extension())
    }

    /// Payload offset in sectors
    pub fn offset_sectors(&self) -> u64 {
        self.offset / SECTOR_SIZE
    }

    /// Payload size rounded up to whole sectors
    pub fn size_sectors(&self) -> u64 {
        sectors_for(self.size)
    }

    /// Bytes the payload occupies on disk including sector padding
    pub fn padded_size(&self) -> u64 {
        align_to_sector(self.size)
    }

    /// Whether this entry still has unflushed in-memory payload
    pub fn has_pending_data(&self) -> bool {
        self.pending_data.is_some()
    }

    /// Human-readable size, binary units
    pub fn format_size(&self) -> String {
        format_size(self.size)
    }
}

/// Format a byte count with binary units
pub(crate) fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn entry(name: &str, offset: u64, size: u64) -> Entry {
        Entry::existing(&RawEntry::new(name, offset, size))
    }

    #[test]
    fn classifies_by_extension() {
        assert_eq!(entry("player.dff", 0, 0).kind(), FileKind::Model);
        assert_eq!(entry("PLAYER.TXD", 0, 0).kind(), FileKind::Texture);
        assert_eq!(entry("area51.col", 0, 0).kind(), FileKind::Collision);
        assert_eq!(entry("noext", 0, 0).kind(), FileKind::Other);
    }

    #[test]
    fn sector_geometry() {
        let e = entry("a.dff", 4096, 3000);
        assert_eq!(e.offset_sectors(), 2);
        assert_eq!(e.size_sectors(), 2);
        assert_eq!(e.padded_size(), 4096);
    }

    #[test]
    fn pending_entries_start_flagged() {
        let e = Entry::pending("new.txd".into(), vec![1, 2, 3]);
        assert!(e.is_new);
        assert!(e.has_pending_data());
        assert_eq!(e.size, 3);
    }

    #[test]
    fn human_readable_sizes() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
