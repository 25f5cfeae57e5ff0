//! Mutable engine over GTA IMG archives
//!
//! [`Archive`] wraps one archive file (plus its `.dir` sidecar for V1) and
//! exposes the full edit lifecycle:
//!
//! - **open/create** — detect the on-disk version, read the directory, map
//!   the payload read-only
//! - **mutate** — [`Archive::add_entry`] / [`Archive::remove_entry`] record
//!   changes in memory only; the file is untouched until a rebuild
//! - **rebuild** — rewrite the archive sector-aligned and gap-free into a
//!   temp file, then atomically swap it over the original
//! - **validate/repair** — structural and deep-content checks producing a
//!   [`validate::ValidationReport`]; auto-repair for the fixable subset
//!
//! Overlapping operations on a shared handle fail fast with
//! [`ArchiveError::Busy`] rather than blocking; rebuilds accept a progress
//! callback and a cooperative cancel flag.

#![warn(missing_docs)]

mod archive;
mod batch;
mod entry;
mod lock;
mod rebuild;

pub mod error;
pub mod validate;

pub use archive::Archive;
pub use batch::BatchReport;
pub use entry::{Entry, FileKind};
pub use error::{ArchiveError, Result};
pub use rebuild::{RebuildOptions, RebuildProgress};
