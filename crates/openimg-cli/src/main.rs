//! `openimg` — inspect and edit GTA IMG archives from the command line

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand, ValueEnum};
use openimg_archive::{Archive, RebuildOptions};
use openimg_archive::validate::{Severity, ValidationOptions};
use openimg_formats::col;
use openimg_formats::img::ImgVersion;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "openimg", version, about = "Inspect and edit GTA IMG archives")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum VersionArg {
    /// GTA III / Vice City (.img + .dir sidecar)
    V1,
    /// GTA San Andreas (embedded VER2 directory)
    V2,
    /// Fastman92 extended format
    Fastman92,
}

impl From<VersionArg> for ImgVersion {
    fn from(arg: VersionArg) -> Self {
        match arg {
            VersionArg::V1 => Self::V1,
            VersionArg::V2 => Self::V2,
            VersionArg::Fastman92 => Self::Fastman92,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Show archive version and summary statistics
    Info { archive: PathBuf },
    /// List entries, optionally filtered by extension
    List {
        archive: PathBuf,
        /// Only entries with this extension (without dot)
        #[arg(long)]
        extension: Option<String>,
    },
    /// Create a new empty archive
    Create {
        archive: PathBuf,
        /// Archive format to create
        #[arg(long, value_enum, default_value = "v2")]
        version: VersionArg,
    },
    /// Extract one entry to a file
    Extract {
        archive: PathBuf,
        /// Entry name (case-insensitive)
        name: String,
        /// Output path; defaults to the entry name in the current directory
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Extract every entry into a directory
    ExtractAll {
        archive: PathBuf,
        destination: PathBuf,
    },
    /// Add (or replace) entries from files and rebuild
    Add {
        archive: PathBuf,
        /// Files to import, named after their file names
        files: Vec<PathBuf>,
    },
    /// Remove an entry and rebuild
    Remove {
        archive: PathBuf,
        /// Entry name (case-insensitive)
        name: String,
    },
    /// Rewrite the archive sector-aligned with no gaps
    Rebuild {
        archive: PathBuf,
        /// Keep a .backup copy of the original
        #[arg(long)]
        backup: bool,
    },
    /// Check the archive and report problems
    Validate {
        archive: PathBuf,
        /// Also read every payload and check content signatures
        #[arg(long)]
        deep: bool,
    },
    /// Apply automatic fixes, then rebuild if anything was fixable
    Repair {
        archive: PathBuf,
        /// Skip the .backup copy of the original
        #[arg(long)]
        no_backup: bool,
    },
    /// Summarize the collision models in a COL file
    ColInfo { file: PathBuf },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    match Cli::parse().command {
        Command::Info { archive } => info(&archive),
        Command::List { archive, extension } => list(&archive, extension.as_deref()),
        Command::Create { archive, version } => create(&archive, version.into()),
        Command::Extract { archive, name, output } => extract(&archive, &name, output),
        Command::ExtractAll { archive, destination } => extract_all(&archive, &destination),
        Command::Add { archive, files } => add(&archive, &files),
        Command::Remove { archive, name } => remove(&archive, &name),
        Command::Rebuild { archive, backup } => rebuild(&archive, backup),
        Command::Validate { archive, deep } => validate(&archive, deep),
        Command::Repair { archive, no_backup } => repair(&archive, !no_backup),
        Command::ColInfo { file } => col_info(&file),
    }
}

fn open(path: &Path) -> anyhow::Result<Archive> {
    Archive::open(path).with_context(|| format!("opening {}", path.display()))
}

fn info(path: &Path) -> anyhow::Result<()> {
    let archive = open(path)?;
    println!("{}: {} archive, {} entries", path.display(), archive.version(), archive.len());
    for (key, value) in archive.statistics() {
        println!("  {key}: {value}");
    }
    Ok(())
}

fn list(path: &Path, extension: Option<&str>) -> anyhow::Result<()> {
    let archive = open(path)?;
    let entries: Vec<_> = match extension {
        Some(ext) => archive.entries_with_extension(ext),
        None => archive.entries().iter().collect(),
    };
    for entry in entries {
        println!(
            "{:<24} {:>10}  sector {:>7}",
            entry.name,
            entry.format_size(),
            entry.offset_sectors()
        );
    }
    Ok(())
}

fn create(path: &Path, version: ImgVersion) -> anyhow::Result<()> {
    Archive::create(path, version).with_context(|| format!("creating {}", path.display()))?;
    println!("created empty {version} archive at {}", path.display());
    Ok(())
}

fn extract(path: &Path, name: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let archive = open(path)?;
    let output = output.unwrap_or_else(|| PathBuf::from(name));
    archive
        .export_entry(name, &output)
        .with_context(|| format!("extracting {name:?}"))?;
    println!("wrote {}", output.display());
    Ok(())
}

fn extract_all(path: &Path, destination: &Path) -> anyhow::Result<()> {
    let archive = open(path)?;
    let report = archive.export_all(destination)?;
    println!("extracted {} entries, {} failed", report.succeeded, report.failed());
    for (name, error) in &report.failures {
        eprintln!("  {name}: {error}");
    }
    if !report.is_complete() {
        bail!("{} entries could not be extracted", report.failed());
    }
    Ok(())
}

fn add(path: &Path, files: &[PathBuf]) -> anyhow::Result<()> {
    if files.is_empty() {
        bail!("no files given");
    }
    let mut archive = open(path)?;
    let report = archive.import_files(files);
    for (name, error) in &report.failures {
        eprintln!("  {name}: {error}");
    }
    if report.succeeded > 0 {
        run_rebuild(&mut archive, false)?;
    }
    println!("added {} entries, {} failed", report.succeeded, report.failed());
    if !report.is_complete() {
        bail!("{} files could not be added", report.failed());
    }
    Ok(())
}

fn remove(path: &Path, name: &str) -> anyhow::Result<()> {
    let mut archive = open(path)?;
    archive.remove_entry(name).with_context(|| format!("removing {name:?}"))?;
    run_rebuild(&mut archive, false)?;
    println!("removed {name}");
    Ok(())
}

fn rebuild(path: &Path, backup: bool) -> anyhow::Result<()> {
    let mut archive = open(path)?;
    run_rebuild(&mut archive, backup)?;
    println!("rebuilt {} ({} entries)", path.display(), archive.len());
    Ok(())
}

fn run_rebuild(archive: &mut Archive, backup: bool) -> anyhow::Result<()> {
    let total = archive.len();
    let completed = archive.rebuild(
        RebuildOptions::new()
            .with_backup(backup)
            .with_progress(move |p| {
                eprintln!("[{}/{}] {}", p.index + 1, total, p.name);
            }),
    )?;
    if !completed {
        bail!("rebuild was cancelled");
    }
    Ok(())
}

fn validate(path: &Path, deep: bool) -> anyhow::Result<()> {
    let archive = open(path)?;
    let report = archive.validate(ValidationOptions { deep_scan: deep });

    for issue in &report.issues {
        let entry = issue.entry.as_deref().unwrap_or("-");
        println!(
            "{:>8}  {:<14} {:<24} {}",
            format!("{:?}", issue.severity),
            format!("{:?}", issue.category),
            entry,
            issue.message
        );
    }
    println!(
        "{} issues ({} auto-repairable), fragmentation {:.1}%",
        report.issues.len(),
        report.repairable_count(),
        report.statistics.get("fragmentation_percent").copied().unwrap_or(0.0)
    );

    if !report.is_valid() {
        let worst = report.worst_severity().unwrap_or(Severity::Error);
        bail!("archive failed validation (worst severity: {worst:?})");
    }
    Ok(())
}

fn repair(path: &Path, backup: bool) -> anyhow::Result<()> {
    let mut archive = open(path)?;
    let report = archive.validate(ValidationOptions::default());
    let outcome = archive.repair(&report, backup).context("repairing archive")?;
    for (old, new) in &outcome.renamed {
        println!("renamed {old} -> {new}");
    }
    println!(
        "repair finished: {} renames, rebuild {}",
        outcome.renamed.len(),
        if outcome.rebuilt { "completed" } else { "skipped" }
    );
    Ok(())
}

fn col_info(path: &Path) -> anyhow::Result<()> {
    let data = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let file = col::parse(&data);

    for model in &file.models {
        println!(
            "{:<22} {}  id {:>5}  spheres {:>4}  boxes {:>4}  faces {:>5}  vertices {:>5}",
            model.name,
            model.version,
            model.model_id,
            model.spheres.len(),
            model.boxes.len(),
            model.faces.len(),
            model.vertices.len()
        );
        let violations = model.face_index_violations();
        if !violations.is_empty() {
            println!("  {} faces reference out-of-range vertices", violations.len());
        }
    }
    println!(
        "{} models, {} of {} bytes consumed",
        file.models.len(),
        file.consumed,
        data.len()
    );
    if file.trailing > 0 {
        bail!("{} trailing bytes were not collision data", file.trailing);
    }
    Ok(())
}
