//! Sector-aligned archive rebuild
//!
//! A rebuild is the single point where deferred mutations reach disk. The
//! new archive is laid out sequentially (directory first for embedded
//! versions, then payloads, each padded to a sector boundary, no gaps),
//! written into a temp file in the archive's directory, and atomically
//! renamed over the original. The open handle is re-mapped afterwards, so
//! a failed or cancelled rebuild leaves both the file and the in-memory
//! state untouched.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use openimg_formats::img::{self, ImgVersion, RawEntry};
use openimg_formats::{FormatError, align_to_sector};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::error::Result;

/// Progress report passed to the rebuild callback before each entry is
/// written
#[derive(Debug)]
pub struct RebuildProgress<'a> {
    /// Zero-based index of the entry about to be written
    pub index: usize,
    /// Total entries in this rebuild
    pub total: usize,
    /// Name of the entry about to be written
    pub name: &'a str,
}

/// Options controlling a rebuild
#[derive(Default)]
pub struct RebuildOptions<'a> {
    pub(crate) progress: Option<Box<dyn FnMut(&RebuildProgress<'_>) + 'a>>,
    pub(crate) cancel: Option<&'a AtomicBool>,
    pub(crate) backup: bool,
}

impl<'a> RebuildOptions<'a> {
    /// Plain rebuild: no progress, no cancellation, no backup
    pub fn new() -> Self {
        Self::default()
    }

    /// Invoke `callback` before each entry is written
    pub fn with_progress(mut self, callback: impl FnMut(&RebuildProgress<'_>) + 'a) -> Self {
        self.progress = Some(Box::new(callback));
        self
    }

    /// Check `flag` between entries; when set, the rebuild stops, discards
    /// the temp file, and returns `Ok(false)` with all state untouched
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Copy the original archive to a `.backup` sibling before the swap
    /// (best effort: a failed backup is logged, not fatal)
    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }
}

impl std::fmt::Debug for RebuildOptions<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RebuildOptions")
            .field("progress", &self.progress.is_some())
            .field("cancel", &self.cancel.is_some())
            .field("backup", &self.backup)
            .finish()
    }
}

impl Archive {
    /// Rewrite the archive from the in-memory directory.
    ///
    /// Returns `Ok(true)` on success and `Ok(false)` when cancelled via
    /// [`RebuildOptions::with_cancel`]. On success all pending payloads are
    /// flushed, tombstones are dropped, transient entry flags are cleared,
    /// and the handle tracks the rewritten file.
    pub fn rebuild(&mut self, mut options: RebuildOptions<'_>) -> Result<bool> {
        let _guard = self.op_lock.acquire()?;
        if !self.version.is_writable() {
            return Err(FormatError::UnsupportedWrite(self.version).into());
        }

        let total = self.entries.len();
        let data_start = img::data_start(self.version, total)?;

        // Sequential layout: payloads in directory order, sector padded
        let mut layout = Vec::with_capacity(total);
        let mut offset = data_start;
        for entry in &self.entries {
            layout.push(RawEntry {
                name: entry.name.clone(),
                offset,
                size: entry.size,
                uncompressed_size: entry.uncompressed_size,
                is_compressed: entry.is_compressed,
            });
            offset += align_to_sector(entry.size);
        }

        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let temp = NamedTempFile::new_in(parent)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            if self.version.has_embedded_directory() {
                img::write_directory(&mut writer, self.version, self.format_version, &layout)?;
            }
            pad_to(&mut writer, img::directory_len(self.version, total)?, data_start)?;

            let mut written = data_start;
            for (index, entry) in self.entries.iter().enumerate() {
                if let Some(flag) = options.cancel
                    && flag.load(Ordering::Relaxed)
                {
                    info!(path = %self.path.display(), index, total, "rebuild cancelled");
                    return Ok(false);
                }
                if let Some(progress) = options.progress.as_mut() {
                    progress(&RebuildProgress {
                        index,
                        total,
                        name: &entry.name,
                    });
                }

                match &entry.pending_data {
                    Some(data) => writer.write_all(data)?,
                    None => writer.write_all(self.payload_slice(entry)?)?,
                }
                written += entry.size;
                pad_to(&mut writer, written, align_to_sector(written))?;
                written = align_to_sector(written);
            }
            writer.flush()?;
        }

        // stage the V1 sidecar next to the archive temp so both files are
        // fully written before either swap; a sidecar failure here leaves
        // the original pair untouched
        let sidecar_temp = if self.version == ImgVersion::V1 {
            let temp = NamedTempFile::new_in(parent)?;
            {
                let mut writer = BufWriter::new(temp.as_file());
                img::write_v1_sidecar(&mut writer, &layout)?;
                writer.flush()?;
            }
            Some(temp)
        } else {
            None
        };

        if options.backup {
            backup_original(&self.path);
        }
        temp.persist(&self.path).map_err(|e| e.error)?;
        if let Some(sidecar_temp) = sidecar_temp {
            sidecar_temp.persist(self.sidecar()).map_err(|e| e.error)?;
        }

        for (entry, raw) in self.entries.iter_mut().zip(&layout) {
            entry.offset = raw.offset;
            entry.is_new = false;
            entry.is_replaced = false;
            entry.pending_data = None;
        }
        self.deleted_entries.clear();
        self.modified = false;

        // track the rewritten file
        let file = std::fs::File::open(&self.path)?;
        self.file_len = file.metadata()?.len();
        self.mmap = crate::archive::map_file(&file, self.file_len)?;

        info!(
            path = %self.path.display(),
            entries = total,
            bytes = self.file_len,
            "rebuild complete"
        );
        Ok(true)
    }

    /// Close gaps left by removed or grown entries.
    ///
    /// The rebuild layout is always sequential, so this is a rebuild under
    /// a name that states the intent.
    pub fn defragment(&mut self, options: RebuildOptions<'_>) -> Result<bool> {
        debug!(path = %self.path.display(), "defragmenting");
        self.rebuild(options)
    }
}

/// Zero-fill from `position` up to `target`
fn pad_to<W: Write>(writer: &mut W, position: u64, target: u64) -> Result<()> {
    if target > position {
        let zeroes = vec![0u8; (target - position) as usize];
        writer.write_all(&zeroes)?;
    }
    Ok(())
}

/// Best-effort copy of the original next to itself before a swap
fn backup_original(path: &Path) {
    let mut backup = path.as_os_str().to_owned();
    backup.push(".backup");
    if let Err(error) = std::fs::copy(path, &backup) {
        warn!(path = %path.display(), %error, "backup copy failed, continuing");
    } else {
        debug!(path = %path.display(), "wrote backup copy");
    }
}
