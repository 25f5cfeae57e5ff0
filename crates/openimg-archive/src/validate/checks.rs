//! The individual validation stages

use openimg_formats::{SECTOR_SIZE, rw};
use tracing::debug;

use super::{Category, Severity, ValidationReport};
use crate::archive::Archive;
use crate::entry::Entry;

/// Characters that break downstream tools even though the record field
/// stores them fine
const INVALID_NAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Fragmentation percentage above which a rebuild is recommended
const FRAGMENTATION_WARNING_PERCENT: f64 = 25.0;

/// Payload sizes above 1 GiB strain the engines this format targets
const OVERSIZE_WARNING_BYTES: u64 = 1 << 30;

/// Directory sizes above this slow the in-game streaming scan
const HIGH_ENTRY_COUNT: usize = 1000;

/// Payloads under 1 KiB waste most of their sector
const SMALL_ENTRY_BYTES: u64 = 1024;

/// Names this close to the 23-character record limit tend to collide
/// after batch renames
const LONG_NAME_LEN: usize = 20;

/// Uncompressed payload volume worth a compression hint (1 MiB)
const COMPRESSIBLE_ADVISORY_BYTES: u64 = 1 << 20;

pub(super) fn check_structure(archive: &Archive, report: &mut ValidationReport) {
    if archive.truncated_directory {
        // a rebuild writes a directory whose count matches its records
        report.push_repairable(
            Severity::Error,
            Category::Structure,
            None,
            format!(
                "directory declared {} records but the file holds fewer",
                archive.declared_count
            ),
            true,
        );
    } else if archive.declared_count as usize != archive.entries.len()
        && !archive.is_modified()
    {
        // readers drop blank records, so a small mismatch is normal
        report.push(
            Severity::Info,
            Category::Structure,
            None,
            format!(
                "directory declares {} records, {} usable entries read",
                archive.declared_count,
                archive.entries.len()
            ),
        );
    }

    if archive.is_modified() {
        report.push(
            Severity::Info,
            Category::Structure,
            None,
            "archive has pending in-memory modifications; rebuild to persist them",
        );
    }
}

pub(super) fn check_names(archive: &Archive, report: &mut ValidationReport) {
    for entry in archive.entries() {
        if entry.name.len() > openimg_formats::MAX_NAME_LEN {
            report.push(
                Severity::Error,
                Category::Compatibility,
                Some(entry.name.as_str()),
                format!(
                    "name is {} characters, directory records hold at most {}",
                    entry.name.len(),
                    openimg_formats::MAX_NAME_LEN
                ),
            );
        }
        if let Some(bad) = entry.name.chars().find(|c| INVALID_NAME_CHARS.contains(c)) {
            report.push(
                Severity::Warning,
                Category::Compatibility,
                Some(entry.name.as_str()),
                format!("name contains invalid character {bad:?}"),
            );
        }
        if entry.extension().is_empty() {
            report.push(
                Severity::Info,
                Category::Compatibility,
                Some(entry.name.as_str()),
                "name has no extension",
            );
        }
    }
}

pub(super) fn check_duplicate_names(archive: &Archive, report: &mut ValidationReport) {
    let mut seen = std::collections::HashMap::new();
    for entry in archive.entries() {
        let key = entry.name.to_ascii_lowercase();
        *seen.entry(key).or_insert(0usize) += 1;
    }
    for (name, count) in seen {
        if count > 1 {
            report.push_repairable(
                Severity::Warning,
                Category::Integrity,
                Some(name.as_str()),
                format!("{count} entries share this name"),
                true,
            );
        }
    }
}

pub(super) fn check_bounds(archive: &Archive, report: &mut ValidationReport) {
    for entry in on_disk(archive) {
        let end = entry.offset + entry.size;
        if end > archive.file_len {
            report.push(
                Severity::Critical,
                Category::Corruption,
                Some(entry.name.as_str()),
                format!(
                    "payload {}..{} runs past the end of the file ({})",
                    entry.offset, end, archive.file_len
                ),
            );
        }
        if entry.size == 0 {
            report.push(
                Severity::Error,
                Category::Integrity,
                Some(entry.name.as_str()),
                "entry has zero size",
            );
        }
        if entry.size > OVERSIZE_WARNING_BYTES {
            report.push(
                Severity::Warning,
                Category::Compatibility,
                Some(entry.name.as_str()),
                format!("entry is {} bytes, larger than 1 GiB", entry.size),
            );
        }
    }
}

pub(super) fn check_overlaps(archive: &Archive, report: &mut ValidationReport) {
    let mut entries: Vec<&Entry> = on_disk(archive).collect();
    entries.sort_by_key(|e| e.offset);

    for pair in entries.windows(2) {
        let (first, second) = (pair[0], pair[1]);
        if first.offset == second.offset {
            report.push(
                Severity::Critical,
                Category::Corruption,
                Some(second.name.as_str()),
                format!(
                    "shares payload offset {} with entry {:?}",
                    first.offset, first.name
                ),
            );
        } else if second.offset < first.offset + first.padded_size() {
            report.push(
                Severity::Critical,
                Category::Corruption,
                Some(second.name.as_str()),
                format!(
                    "payload at {} overlaps entry {:?} ending at {}",
                    second.offset,
                    first.name,
                    first.offset + first.padded_size()
                ),
            );
        }
    }
}

pub(super) fn check_alignment(archive: &Archive, report: &mut ValidationReport) {
    for entry in on_disk(archive) {
        if entry.offset % SECTOR_SIZE != 0 {
            report.push_repairable(
                Severity::Error,
                Category::Compatibility,
                Some(entry.name.as_str()),
                format!("payload offset {} is not sector aligned", entry.offset),
                true,
            );
        }
    }
}

pub(super) fn check_fragmentation(archive: &Archive, report: &mut ValidationReport) {
    let (gaps, percent) = archive.fragmentation();
    if gaps == 0 {
        return;
    }
    if percent > FRAGMENTATION_WARNING_PERCENT {
        report.push_repairable(
            Severity::Warning,
            Category::Performance,
            None,
            format!("{gaps} wasted bytes between payloads ({percent:.1}% fragmentation)"),
            true,
        );
    } else {
        report.push_repairable(
            Severity::Info,
            Category::Performance,
            None,
            format!("{gaps} wasted bytes between payloads ({percent:.1}% fragmentation)"),
            true,
        );
    }
}

/// Performance and compatibility advisories. Everything here is Info or
/// Warning, so the report stays valid no matter what fires.
pub(super) fn check_advisories(archive: &Archive, report: &mut ValidationReport) {
    let count = archive.entries().len();
    if count > HIGH_ENTRY_COUNT {
        report.push(
            Severity::Warning,
            Category::Performance,
            None,
            format!("directory holds {count} entries; consider splitting the archive"),
        );
    }

    let small = archive
        .entries()
        .iter()
        .filter(|e| e.size < SMALL_ENTRY_BYTES)
        .count();
    if count > 0 && small * 2 > count {
        report.push(
            Severity::Info,
            Category::Performance,
            None,
            format!(
                "{small} of {count} entries are under 1 KiB; consider bundling related files"
            ),
        );
    }

    let long_names = archive
        .entries()
        .iter()
        .filter(|e| e.name.len() > LONG_NAME_LEN)
        .count();
    if long_names > 0 {
        report.push(
            Severity::Info,
            Category::Compatibility,
            None,
            format!("{long_names} entry names are longer than {LONG_NAME_LEN} characters"),
        );
    }

    // rough zlib estimate for payloads stored uncompressed
    let uncompressed: u64 = archive
        .entries()
        .iter()
        .filter(|e| !e.is_compressed)
        .map(|e| e.size)
        .sum();
    if archive.version() == openimg_formats::img::ImgVersion::Fastman92
        && uncompressed > COMPRESSIBLE_ADVISORY_BYTES
    {
        report.push(
            Severity::Info,
            Category::Performance,
            None,
            format!(
                "{} bytes stored uncompressed; compressing could reclaim roughly {}",
                uncompressed,
                uncompressed / 2
            ),
        );
    }
}

/// Read every payload and judge it against its extension
pub(super) fn deep_scan(archive: &Archive, report: &mut ValidationReport) {
    for entry in archive.entries() {
        // raw compressed bytes cannot be judged against signatures
        if entry.is_compressed {
            continue;
        }
        let data = match &entry.pending_data {
            Some(data) => data.as_slice(),
            None => match archive.payload_slice(entry) {
                Ok(data) => data,
                // bounds stage already reported this entry
                Err(_) => continue,
            },
        };
        if data.is_empty() {
            continue;
        }

        let digest = md5::compute(data);
        debug!(name = %entry.name, checksum = %format!("{digest:x}"), "deep scanned entry");

        if let Some(false) = rw::matches_extension(&entry.extension(), data) {
            report.push(
                Severity::Error,
                Category::Corruption,
                Some(entry.name.as_str()),
                "payload does not match the signature for its extension",
            );
        }

        let first = data[0];
        if data.len() >= 32 && data.iter().all(|&b| b == first) {
            report.push(
                Severity::Warning,
                Category::Corruption,
                Some(entry.name.as_str()),
                format!("payload is a uniform 0x{first:02X} byte fill"),
            );
        }
    }
}

fn on_disk(archive: &Archive) -> impl Iterator<Item = &Entry> {
    archive.entries().iter().filter(|e| !e.has_pending_data())
}
