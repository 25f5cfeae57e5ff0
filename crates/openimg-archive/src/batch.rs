//! Best-effort bulk import and export
//!
//! Batch operations never stop at the first failure: each item succeeds or
//! is recorded with its error, and the caller gets the full tally.

use std::path::Path;

use tracing::{info, warn};

use crate::archive::Archive;
use crate::error::Result;

/// Tally of a batch operation
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    /// Items processed successfully
    pub succeeded: usize,
    /// Items that failed, as (item, error) pairs
    pub failures: Vec<(String, String)>,
}

impl BatchReport {
    /// Number of failed items
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Whether every item succeeded
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn record(&mut self, item: &str, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(error) => {
                warn!(item, %error, "batch item failed");
                self.failures.push((item.to_string(), error.to_string()));
            }
        }
    }
}

impl Archive {
    /// Add each file as an entry named after its file name.
    ///
    /// Files that cannot be read or whose names are invalid are skipped
    /// and reported; the rest are added as pending entries awaiting a
    /// rebuild.
    pub fn import_files(&mut self, paths: &[impl AsRef<Path>]) -> BatchReport {
        let mut report = BatchReport::default();
        for path in paths {
            let path = path.as_ref();
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let result = std::fs::read(path)
                .map_err(Into::into)
                .and_then(|data| self.add_entry(&name, data));
            report.record(&name, result);
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            "import finished"
        );
        report
    }

    /// Write every entry into `destination`, one file per entry.
    ///
    /// The directory is created if missing. Entries that cannot be read
    /// (out-of-bounds payloads in a damaged archive) are reported and
    /// skipped.
    pub fn export_all(&self, destination: impl AsRef<Path>) -> Result<BatchReport> {
        let destination = destination.as_ref();
        std::fs::create_dir_all(destination)?;

        let mut report = BatchReport::default();
        for entry in self.entries() {
            let result = self.export_entry(&entry.name, destination.join(&entry.name));
            report.record(&entry.name, result);
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed(),
            destination = %destination.display(),
            "export finished"
        );
        Ok(report)
    }
}
