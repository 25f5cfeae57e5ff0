//! Archive validation and repair
//!
//! [`Archive::validate`] runs a fixed pipeline of checks over the current
//! directory and (optionally) the payload bytes, producing a
//! [`ValidationReport`]: a list of [`Issue`]s plus summary statistics.
//! Checks never mutate the archive; [`Archive::repair`] applies the
//! auto-repairable subset (duplicate-name renames) and, when the report
//! carried anything repairable, finishes with one rebuild that squeezes
//! out gaps and stale payloads.

mod checks;
mod repair;

pub use repair::RepairOutcome;

use std::collections::BTreeMap;

use tracing::debug;

use crate::archive::Archive;

/// How bad an issue is
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    /// Informational, nothing wrong
    Info,
    /// Suboptimal but usable
    Warning,
    /// The archive violates the format; some consumers will fail
    Error,
    /// The archive is damaged; data loss is likely
    Critical,
}

/// What part of the archive an issue concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Header and directory layout
    Structure,
    /// Directory self-consistency
    Integrity,
    /// Wasted space and fragmentation
    Performance,
    /// Conventions some consumers rely on
    Compatibility,
    /// Damaged or mismatched payload data
    Corruption,
}

/// One finding from the validation pipeline
#[derive(Debug, Clone)]
pub struct Issue {
    /// How bad it is
    pub severity: Severity,
    /// What it concerns
    pub category: Category,
    /// Human-readable description
    pub message: String,
    /// Entry the issue pertains to, when entry-specific
    pub entry: Option<String>,
    /// Whether [`Archive::repair`] can fix it
    pub auto_repairable: bool,
}

/// Options for a validation run
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidationOptions {
    /// Also read every payload and judge it against its extension
    /// signature (slower; touches the whole file)
    pub deep_scan: bool,
}

/// Result of a validation run
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    /// All findings, in pipeline order
    pub issues: Vec<Issue>,
    /// Summary statistics (see [`Archive::statistics`] for the keys)
    pub statistics: BTreeMap<String, f64>,
}

impl ValidationReport {
    /// Whether the archive is usable: no findings at `Error` or above
    pub fn is_valid(&self) -> bool {
        self.worst_severity() < Some(Severity::Error)
    }

    /// The most severe finding, if any
    pub fn worst_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    /// Findings at exactly the given severity
    pub fn issues_with_severity(&self, severity: Severity) -> Vec<&Issue> {
        self.issues
            .iter()
            .filter(|i| i.severity == severity)
            .collect()
    }

    /// Number of findings repair can fix
    pub fn repairable_count(&self) -> usize {
        self.issues.iter().filter(|i| i.auto_repairable).count()
    }

    pub(crate) fn push(
        &mut self,
        severity: Severity,
        category: Category,
        entry: Option<&str>,
        message: impl Into<String>,
    ) {
        self.push_repairable(severity, category, entry, message, false);
    }

    pub(crate) fn push_repairable(
        &mut self,
        severity: Severity,
        category: Category,
        entry: Option<&str>,
        message: impl Into<String>,
        auto_repairable: bool,
    ) {
        self.issues.push(Issue {
            severity,
            category,
            message: message.into(),
            entry: entry.map(str::to_string),
            auto_repairable,
        });
    }
}

impl Archive {
    /// Run the validation pipeline.
    ///
    /// The stages, in order: header structure, directory counts, entry
    /// names, duplicate names, payload bounds, offset overlaps, sector
    /// alignment, fragmentation, (with [`ValidationOptions::deep_scan`])
    /// payload content checks, and finally performance advisories.
    pub fn validate(&self, options: ValidationOptions) -> ValidationReport {
        let mut report = ValidationReport::default();

        checks::check_structure(self, &mut report);
        checks::check_names(self, &mut report);
        checks::check_duplicate_names(self, &mut report);
        checks::check_bounds(self, &mut report);
        checks::check_overlaps(self, &mut report);
        checks::check_alignment(self, &mut report);
        checks::check_fragmentation(self, &mut report);
        if options.deep_scan {
            checks::deep_scan(self, &mut report);
        }
        checks::check_advisories(self, &mut report);

        report.statistics = self.statistics();
        debug!(
            path = %self.path().display(),
            issues = report.issues.len(),
            worst = ?report.worst_severity(),
            "validation finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn severity_ordering_drives_is_valid() {
        let mut report = ValidationReport::default();
        assert!(report.is_valid());

        report.push(Severity::Warning, Category::Performance, None, "gaps");
        assert!(report.is_valid());

        report.push(Severity::Critical, Category::Corruption, None, "overlap");
        assert!(!report.is_valid());
        assert_eq!(report.worst_severity(), Some(Severity::Critical));
        assert_eq!(report.issues_with_severity(Severity::Warning).len(), 1);
    }
}
