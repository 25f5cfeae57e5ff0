//! Archive lifecycle and the deferred-mutation directory

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::Mmap;
use openimg_formats::img::{self, ImgVersion};
use tracing::{debug, info};

use crate::entry::Entry;
use crate::error::{ArchiveError, Result};
use crate::lock::OpLock;

/// A mutable handle over one IMG archive.
///
/// Mutations are deferred: [`add_entry`](Self::add_entry) and
/// [`remove_entry`](Self::remove_entry) only edit the in-memory directory,
/// and the file changes when [`rebuild`](Self::rebuild) runs. Reads of
/// unmodified entries go through a read-only memory map of the backing
/// file.
#[derive(Debug)]
pub struct Archive {
    pub(crate) path: PathBuf,
    pub(crate) version: ImgVersion,
    /// Fastman92 internal format version, 0 elsewhere
    pub(crate) format_version: u32,
    pub(crate) entries: Vec<Entry>,
    /// Entries removed since the last rebuild, kept for reporting until
    /// the rebuild consumes them
    pub(crate) deleted_entries: Vec<Entry>,
    pub(crate) modified: bool,
    /// Entry count the directory header declared when opened
    pub(crate) declared_count: u32,
    /// The directory declared more records than the file held
    pub(crate) truncated_directory: bool,
    pub(crate) file_len: u64,
    pub(crate) mmap: Option<Mmap>,
    pub(crate) op_lock: OpLock,
}

impl Archive {
    /// Open an existing archive, detecting its version from the header.
    ///
    /// Headerless files are treated as V1 and require a `.dir` sidecar
    /// next to the archive.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_len = file.metadata()?.len();
        let mmap = map_file(&file, file_len)?;
        let data = mmap.as_deref().unwrap_or(&[]);

        let (version, directory) = match ImgVersion::detect(data) {
            // headerless V1 detects as Unknown; only the sidecar tells
            // a real archive apart from arbitrary bytes
            ImgVersion::V1 | ImgVersion::Unknown => {
                let sidecar = sidecar_path(&path);
                if !sidecar.exists() {
                    return Err(match data.get(..4) {
                        Some(sig) => openimg_formats::FormatError::UnknownSignature(
                            sig.try_into().unwrap_or_default(),
                        ),
                        None => openimg_formats::FormatError::MissingSidecar(sidecar),
                    }
                    .into());
                }
                (ImgVersion::V1, img::read_v1_directory(&std::fs::read(&sidecar)?)?)
            }
            version => (version, img::read_directory(data, version)?),
        };

        info!(
            path = %path.display(),
            %version,
            entries = directory.entries.len(),
            "opened archive"
        );
        Ok(Self {
            path,
            version,
            format_version: directory.format_version,
            entries: directory.entries.iter().map(Entry::existing).collect(),
            deleted_entries: Vec::new(),
            modified: false,
            declared_count: directory.declared_count,
            truncated_directory: directory.truncated,
            file_len,
            mmap,
            op_lock: OpLock::default(),
        })
    }

    /// Create a new empty archive on disk and open it.
    ///
    /// V1 creates the payload file plus an empty `.dir` sidecar; V2 and
    /// Fastman92 write an empty embedded directory padded to a sector. V3
    /// archives cannot be created.
    pub fn create(path: impl AsRef<Path>, version: ImgVersion) -> Result<Self> {
        let path = path.as_ref();
        match version {
            ImgVersion::V1 => {
                std::fs::write(path, [])?;
                std::fs::write(sidecar_path(path), [])?;
            }
            ImgVersion::V2 | ImgVersion::Fastman92 => {
                let mut data = Vec::new();
                {
                    let mut cursor = std::io::Cursor::new(&mut data);
                    img::write_directory(&mut cursor, version, default_format_version(version), &[])?;
                }
                data.resize(img::data_start(version, 0)? as usize, 0);
                std::fs::write(path, data)?;
            }
            ImgVersion::V3 | ImgVersion::Unknown => {
                return Err(openimg_formats::FormatError::UnsupportedWrite(version).into());
            }
        }
        info!(path = %path.display(), %version, "created empty archive");
        Self::open(path)
    }

    /// Archive file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Detected archive version
    pub fn version(&self) -> ImgVersion {
        self.version
    }

    /// Current entries, pending mutations included
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    /// Entries removed since the last rebuild
    pub fn deleted_entries(&self) -> &[Entry] {
        &self.deleted_entries
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the archive holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether unflushed mutations exist
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Look up an entry by name, case-insensitively
    pub fn find_entry(&self, name: &str) -> Option<&Entry> {
        self.entry_index(name).map(|i| &self.entries[i])
    }

    /// All entries with the given extension (without dot, case-insensitive)
    pub fn entries_with_extension(&self, extension: &str) -> Vec<&Entry> {
        let wanted = extension.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(|e| e.extension() == wanted)
            .collect()
    }

    /// Add a new entry, or replace an existing one with the same name.
    ///
    /// The payload is held in memory until the next rebuild; the file on
    /// disk does not change here.
    pub fn add_entry(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let _guard = self.op_lock.acquire()?;
        validate_name(name)?;

        let size = data.len() as u64;
        if let Some(index) = self.entry_index(name) {
            let entry = &mut self.entries[index];
            debug!(name, size, "replacing entry");
            entry.pending_data = Some(data);
            entry.size = size;
            entry.uncompressed_size = size;
            entry.is_compressed = false;
            if !entry.is_new {
                entry.is_replaced = true;
            }
        } else {
            debug!(name, size, "adding entry");
            self.entries.push(Entry::pending(name.to_string(), data));
        }
        self.modified = true;
        Ok(())
    }

    /// Remove an entry by name.
    ///
    /// The payload stays in the file until the next rebuild; until then the
    /// removal is only recorded in the directory.
    pub fn remove_entry(&mut self, name: &str) -> Result<()> {
        let _guard = self.op_lock.acquire()?;
        let index = self
            .entry_index(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;

        let entry = self.entries.remove(index);
        debug!(name = %entry.name, "removing entry");
        // Entries never written to disk leave no tombstone
        if !entry.is_new {
            self.deleted_entries.push(entry);
        }
        self.modified = true;
        Ok(())
    }

    /// Read an entry's payload: pending in-memory data when present,
    /// otherwise the bytes currently on disk.
    pub fn read_entry(&self, name: &str) -> Result<Vec<u8>> {
        let index = self
            .entry_index(name)
            .ok_or_else(|| ArchiveError::NotFound(name.to_string()))?;
        let entry = &self.entries[index];
        if let Some(data) = &entry.pending_data {
            return Ok(data.clone());
        }
        self.payload_slice(entry).map(<[u8]>::to_vec)
    }

    /// Write an entry's payload to `destination`
    pub fn export_entry(&self, name: &str, destination: impl AsRef<Path>) -> Result<()> {
        let data = self.read_entry(name)?;
        std::fs::write(destination.as_ref(), data)?;
        debug!(name, destination = %destination.as_ref().display(), "exported entry");
        Ok(())
    }

    /// Summary statistics over the current directory.
    ///
    /// Keys: `entry_count`, `archive_size`, `total_size`, `largest_entry`,
    /// `smallest_entry`, `total_gaps`, `fragmentation_percent`, and one
    /// `ext_<extension>` count per extension present.
    pub fn statistics(&self) -> BTreeMap<String, f64> {
        let mut stats = BTreeMap::new();
        stats.insert("entry_count".to_string(), self.entries.len() as f64);
        stats.insert("archive_size".to_string(), self.file_len as f64);

        let total: u64 = self.entries.iter().map(|e| e.size).sum();
        stats.insert("total_size".to_string(), total as f64);
        if let Some(largest) = self.entries.iter().map(|e| e.size).max() {
            stats.insert("largest_entry".to_string(), largest as f64);
        }
        if let Some(smallest) = self.entries.iter().map(|e| e.size).min() {
            stats.insert("smallest_entry".to_string(), smallest as f64);
        }

        let (gaps, fragmentation) = self.fragmentation();
        stats.insert("total_gaps".to_string(), gaps as f64);
        stats.insert("fragmentation_percent".to_string(), fragmentation);

        for entry in &self.entries {
            let extension = entry.extension();
            let key = if extension.is_empty() {
                "ext_none".to_string()
            } else {
                format!("ext_{extension}")
            };
            *stats.entry(key).or_insert(0.0) += 1.0;
        }
        stats
    }

    /// Gap bytes between on-disk payloads and the resulting fragmentation
    /// percentage (gaps / (used + gaps) * 100)
    pub(crate) fn fragmentation(&self) -> (u64, f64) {
        let mut on_disk: Vec<&Entry> = self
            .entries
            .iter()
            .filter(|e| !e.has_pending_data())
            .collect();
        on_disk.sort_by_key(|e| e.offset);

        let mut gaps = 0u64;
        let mut used = 0u64;
        let mut cursor: Option<u64> = None;
        for entry in on_disk {
            if let Some(end) = cursor {
                gaps += entry.offset.saturating_sub(end);
            }
            used += entry.padded_size();
            cursor = Some(entry.offset + entry.padded_size());
        }

        let span = used + gaps;
        let fragmentation = if span == 0 {
            0.0
        } else {
            gaps as f64 / span as f64 * 100.0
        };
        (gaps, fragmentation)
    }

    /// Bounded view of an on-disk payload
    pub(crate) fn payload_slice(&self, entry: &Entry) -> Result<&[u8]> {
        let end = entry.offset + entry.size;
        if end > self.file_len {
            return Err(ArchiveError::PayloadOutOfBounds {
                name: entry.name.clone(),
                offset: entry.offset,
                end,
                file_len: self.file_len,
            });
        }
        let data = self.mmap.as_deref().unwrap_or(&[]);
        Ok(&data[entry.offset as usize..end as usize])
    }

    pub(crate) fn entry_index(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| e.name.eq_ignore_ascii_case(name))
    }

    /// Path of the V1 directory sidecar for this archive
    pub(crate) fn sidecar(&self) -> PathBuf {
        sidecar_path(&self.path)
    }

}

/// Fastman92 archives written here use format version 1
pub(crate) fn default_format_version(version: ImgVersion) -> u32 {
    u32::from(version == ImgVersion::Fastman92)
}

fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("dir")
}

#[allow(unsafe_code)]
pub(crate) fn map_file(file: &File, len: u64) -> Result<Option<Mmap>> {
    if len == 0 {
        return Ok(None);
    }
    // Safety: the map is read-only; rebuilds replace the file via rename
    // and re-map instead of writing through the mapping.
    let mmap = unsafe { Mmap::map(file)? };
    Ok(Some(mmap))
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ArchiveError::InvalidName {
            name: name.to_string(),
            reason: "name is empty",
        });
    }
    if name.len() > openimg_formats::MAX_NAME_LEN {
        return Err(ArchiveError::InvalidName {
            name: name.to_string(),
            reason: "name exceeds 23 characters",
        });
    }
    if name.bytes().any(|b| b == 0 || b == b'/' || b == b'\\') {
        return Err(ArchiveError::InvalidName {
            name: name.to_string(),
            reason: "name contains a path separator or NUL",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn temp_archive(version: ImgVersion) -> (tempfile::TempDir, Archive) {
        let dir = tempfile::tempdir().expect("create temp dir");
        let archive =
            Archive::create(dir.path().join("test.img"), version).expect("create archive");
        (dir, archive)
    }

    #[test]
    fn creates_and_reopens_empty_v2() {
        let (dir, archive) = temp_archive(ImgVersion::V2);
        assert_eq!(archive.version(), ImgVersion::V2);
        assert!(archive.is_empty());
        assert!(!archive.is_modified());

        let reopened = Archive::open(dir.path().join("test.img")).expect("reopen");
        assert_eq!(reopened.version(), ImgVersion::V2);
        assert_eq!(reopened.len(), 0);
    }

    #[test]
    fn creates_v1_with_sidecar() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("legacy.img");
        let archive = Archive::create(&path, ImgVersion::V1).expect("create archive");
        assert_eq!(archive.version(), ImgVersion::V1);
        assert!(dir.path().join("legacy.dir").exists());
    }

    #[test]
    fn unrecognized_header_without_sidecar_is_rejected() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("orphan.img");
        std::fs::write(&path, vec![0u8; 4096]).expect("write file");
        let err = Archive::open(&path).expect_err("should reject");
        assert!(matches!(
            err,
            ArchiveError::Format(openimg_formats::FormatError::UnknownSignature(_))
        ));
    }

    #[test]
    fn empty_file_without_sidecar_is_rejected() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("empty.img");
        std::fs::write(&path, []).expect("write file");
        let err = Archive::open(&path).expect_err("should reject");
        assert!(matches!(
            err,
            ArchiveError::Format(openimg_formats::FormatError::MissingSidecar(_))
        ));
    }

    #[test]
    fn headerless_payload_with_sidecar_opens_as_v1() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("legacy.img");
        std::fs::write(&path, vec![0x10u8; 2048]).expect("write payload");

        let mut dir_data = Vec::new();
        dir_data.extend_from_slice(&0u32.to_le_bytes());
        dir_data.extend_from_slice(&1u32.to_le_bytes());
        dir_data.extend_from_slice(
            &openimg_formats::encode_name("gta3.dff").expect("valid name"),
        );
        std::fs::write(dir.path().join("legacy.dir"), dir_data).expect("write sidecar");

        let archive = Archive::open(&path).expect("open");
        assert_eq!(archive.version(), ImgVersion::V1);
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn cannot_create_v3() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let err = Archive::create(dir.path().join("iv.img"), ImgVersion::V3)
            .expect_err("should reject");
        assert!(matches!(
            err,
            ArchiveError::Format(openimg_formats::FormatError::UnsupportedWrite(_))
        ));
    }

    #[test]
    fn add_entry_defers_to_memory() {
        let (dir, mut archive) = temp_archive(ImgVersion::V2);
        let on_disk_before = std::fs::read(dir.path().join("test.img")).expect("read file");

        archive.add_entry("player.dff", vec![1, 2, 3]).expect("add");
        assert!(archive.is_modified());
        assert_eq!(archive.len(), 1);
        assert!(archive.entries()[0].is_new);
        assert_eq!(archive.read_entry("player.dff").expect("read"), vec![1, 2, 3]);

        // nothing hits the file until rebuild
        let on_disk_after = std::fs::read(dir.path().join("test.img")).expect("read file");
        assert_eq!(on_disk_before, on_disk_after);
    }

    #[test]
    fn replacing_keeps_one_entry_and_flags_it() {
        let (_dir, mut archive) = temp_archive(ImgVersion::V2);
        archive.add_entry("a.txd", vec![1]).expect("add");
        archive.add_entry("A.TXD", vec![2, 3]).expect("replace");

        assert_eq!(archive.len(), 1);
        let entry = &archive.entries()[0];
        // replacing a never-flushed entry keeps it "new"
        assert!(entry.is_new);
        assert!(!entry.is_replaced);
        assert_eq!(archive.read_entry("a.txd").expect("read"), vec![2, 3]);
    }

    #[test]
    fn remove_of_new_entry_leaves_no_tombstone() {
        let (_dir, mut archive) = temp_archive(ImgVersion::V2);
        archive.add_entry("gone.col", vec![0; 10]).expect("add");
        archive.remove_entry("gone.col").expect("remove");

        assert!(archive.is_empty());
        assert!(archive.deleted_entries().is_empty());
        assert!(archive.is_modified());
    }

    #[test]
    fn remove_missing_entry_fails() {
        let (_dir, mut archive) = temp_archive(ImgVersion::V2);
        assert!(matches!(
            archive.remove_entry("nope.dff"),
            Err(ArchiveError::NotFound(_))
        ));
    }

    #[test]
    fn rejects_bad_names() {
        let (_dir, mut archive) = temp_archive(ImgVersion::V2);
        assert!(matches!(
            archive.add_entry("", vec![]),
            Err(ArchiveError::InvalidName { .. })
        ));
        assert!(matches!(
            archive.add_entry(&"x".repeat(24), vec![]),
            Err(ArchiveError::InvalidName { .. })
        ));
        assert!(matches!(
            archive.add_entry("a/b.dff", vec![]),
            Err(ArchiveError::InvalidName { .. })
        ));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let (_dir, mut archive) = temp_archive(ImgVersion::V2);
        archive.add_entry("Player.DFF", vec![1]).expect("add");
        assert!(archive.find_entry("player.dff").is_some());
        assert_eq!(archive.entries_with_extension("dff").len(), 1);
        assert!(archive.entries_with_extension("txd").is_empty());
    }

    #[test]
    fn statistics_cover_extensions() {
        let (_dir, mut archive) = temp_archive(ImgVersion::V2);
        archive.add_entry("a.dff", vec![0; 100]).expect("add");
        archive.add_entry("b.dff", vec![0; 300]).expect("add");
        archive.add_entry("c.txd", vec![0; 200]).expect("add");

        let stats = archive.statistics();
        assert_eq!(stats["entry_count"], 3.0);
        assert_eq!(stats["total_size"], 600.0);
        assert_eq!(stats["largest_entry"], 300.0);
        assert_eq!(stats["ext_dff"], 2.0);
        assert_eq!(stats["ext_txd"], 1.0);
    }
}
