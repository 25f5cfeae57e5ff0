//! Automatic repair of the fixable validation findings

use tracing::{debug, info, warn};

use super::ValidationReport;
use crate::archive::Archive;
use crate::error::Result;
use crate::rebuild::RebuildOptions;

/// What a repair run did
#[derive(Debug, Clone, Default)]
pub struct RepairOutcome {
    /// Duplicate entries renamed, as (old, new) pairs
    pub renamed: Vec<(String, String)>,
    /// Whether a finishing rebuild ran
    pub rebuilt: bool,
}

impl Archive {
    /// Fix what can be fixed without guessing: rename duplicate names
    /// apart, then rebuild once when `report` carried anything
    /// auto-repairable. The rebuild itself clears gaps, misalignment, and
    /// stale payloads. With `backup` set, a `.backup` copy of the original
    /// is attempted first; failure to write it is logged, not fatal.
    ///
    /// A clean report leaves the file alone and returns with `rebuilt`
    /// false. Corruption findings (overlapping or out-of-bounds payloads)
    /// are not touched; deciding which of two overlapping entries owns the
    /// bytes is the caller's call.
    pub fn repair(&mut self, report: &ValidationReport, backup: bool) -> Result<RepairOutcome> {
        let mut outcome = RepairOutcome::default();

        {
            let _guard = self.op_lock.acquire()?;
            let mut taken: std::collections::HashSet<String> = std::collections::HashSet::new();
            for index in 0..self.entries.len() {
                let lower = self.entries[index].name.to_ascii_lowercase();
                if taken.insert(lower) {
                    continue;
                }
                let old = self.entries[index].name.clone();
                let new = unique_name(&old, |candidate| {
                    let lower = candidate.to_ascii_lowercase();
                    !self
                        .entries
                        .iter()
                        .any(|e| e.name.eq_ignore_ascii_case(&lower))
                });
                info!(%old, %new, "renaming duplicate entry");
                self.entries[index].name.clone_from(&new);
                self.modified = true;
                outcome.renamed.push((old, new));
            }
        }

        if report.repairable_count() == 0 && outcome.renamed.is_empty() {
            debug!(path = %self.path.display(), "nothing repairable, skipping rebuild");
            return Ok(outcome);
        }

        outcome.rebuilt = self.rebuild(RebuildOptions::new().with_backup(backup))?;
        if !outcome.rebuilt {
            warn!(path = %self.path.display(), "repair rebuild did not complete");
        }
        Ok(outcome)
    }
}

/// Derive `stem_N.ext` from `name`, shrinking the stem when the suffix
/// would push past the 23-character record limit
fn unique_name(name: &str, available: impl Fn(&str) -> bool) -> String {
    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, Some(ext)),
        None => (name, None),
    };

    for counter in 1u32.. {
        let suffix = format!("_{counter}");
        let reserved = suffix.len() + extension.map_or(0, |e| e.len() + 1);
        let mut keep = stem
            .len()
            .min(openimg_formats::MAX_NAME_LEN.saturating_sub(reserved));
        // lossy-decoded names can hold multi-byte characters; back off to
        // the nearest boundary instead of slicing through one
        while !stem.is_char_boundary(keep) {
            keep -= 1;
        }
        let candidate = match extension {
            Some(ext) => format!("{}{suffix}.{ext}", &stem[..keep]),
            None => format!("{}{suffix}", &stem[..keep]),
        };
        if available(&candidate) {
            return candidate;
        }
    }
    unreachable!("u32 counter space exhausted")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use openimg_formats::img::{self, ImgVersion, RawEntry};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn unique_name_appends_counter_before_extension() {
        assert_eq!(unique_name("player.dff", |_| true), "player_1.dff");
        assert_eq!(unique_name("noext", |_| true), "noext_1");
        // second candidate when the first is taken
        assert_eq!(
            unique_name("player.dff", |c| c != "player_1.dff"),
            "player_2.dff"
        );
    }

    #[test]
    fn unique_name_respects_length_limit() {
        let long = "a".repeat(23 - 4); // "aaaa....aaa.dff" at the limit
        let name = format!("{long}.dff");
        let renamed = unique_name(&name, |_| true);
        assert!(renamed.len() <= openimg_formats::MAX_NAME_LEN);
        assert!(renamed.ends_with(".dff"));
        assert!(renamed.contains("_1"));
    }

    #[test]
    fn unique_name_backs_off_to_char_boundaries() {
        // lossy name decodes turn raw high bytes into three-byte
        // replacement characters; shrinking must not split one
        let name = format!("{}.dff", "\u{FFFD}".repeat(10));
        let renamed = unique_name(&name, |_| true);
        assert!(renamed.len() <= openimg_formats::MAX_NAME_LEN);
        assert!(renamed.ends_with("_1.dff"));
        assert_eq!(renamed.trim_end_matches("_1.dff"), "\u{FFFD}".repeat(5));
    }

    /// V2 fixture with the same name on two sector-aligned payloads
    fn duplicate_fixture(path: &std::path::Path, name: &str) {
        let raw = vec![RawEntry::new(name, 2048, 4), RawEntry::new(name, 4096, 4)];
        let mut file = Vec::new();
        {
            let mut cursor = Cursor::new(&mut file);
            img::write_directory(&mut cursor, ImgVersion::V2, 0, &raw).expect("write directory");
        }
        file.resize(6144, 0);
        file[2048..2052].copy_from_slice(b"1111");
        file[4096..4100].copy_from_slice(b"2222");
        std::fs::write(path, file).expect("write fixture");
    }

    #[test]
    fn repair_renames_duplicates_and_rebuilds() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("dupes.img");
        duplicate_fixture(&path, "same.dat");

        let mut archive = crate::Archive::open(&path).expect("open");
        let report = archive.validate(Default::default());
        assert_eq!(report.repairable_count(), 1);

        let outcome = archive.repair(&report, true).expect("repair");
        assert!(outcome.rebuilt);
        assert_eq!(outcome.renamed, vec![("same.dat".to_string(), "same_1.dat".to_string())]);

        // both payloads survive under distinct names (sector padded)
        assert_eq!(&archive.read_entry("same.dat").expect("read")[..4], b"1111");
        assert_eq!(&archive.read_entry("same_1.dat").expect("read")[..4], b"2222");
        assert!(archive.validate(Default::default()).is_valid());
        assert!({
            let mut backup = path.as_os_str().to_owned();
            backup.push(".backup");
            std::path::PathBuf::from(backup).exists()
        });
    }

    #[test]
    fn repair_renames_multibyte_duplicates() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("accents.img");
        // 9 two-byte characters + ".dff" = 22 bytes, fits the record
        let name = format!("{}.dff", "é".repeat(9));
        duplicate_fixture(&path, &name);

        let mut archive = crate::Archive::open(&path).expect("open");
        let report = archive.validate(Default::default());
        let outcome = archive.repair(&report, false).expect("repair");

        assert!(outcome.rebuilt);
        let renamed = &outcome.renamed[0].1;
        assert!(renamed.len() <= openimg_formats::MAX_NAME_LEN);
        assert!(renamed.ends_with("_1.dff"));
        assert!(archive.validate(Default::default()).is_valid());
        // backup was not requested
        let mut backup = path.as_os_str().to_owned();
        backup.push(".backup");
        assert!(!std::path::PathBuf::from(backup).exists());
    }

    #[test]
    fn clean_report_skips_the_rebuild() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("clean.img");
        let raw = vec![RawEntry::new("a.dat", 2048, 4)];
        let mut file = Vec::new();
        {
            let mut cursor = Cursor::new(&mut file);
            img::write_directory(&mut cursor, ImgVersion::V2, 0, &raw).expect("write directory");
        }
        file.resize(4096, 0);
        file[2048..2052].copy_from_slice(b"1111");
        std::fs::write(&path, &file).expect("write fixture");

        let mut archive = crate::Archive::open(&path).expect("open");
        let report = archive.validate(Default::default());
        assert_eq!(report.repairable_count(), 0);

        let outcome = archive.repair(&report, true).expect("repair");
        assert!(!outcome.rebuilt);
        assert!(outcome.renamed.is_empty());
        assert_eq!(std::fs::read(&path).expect("read back"), file);
    }
}
