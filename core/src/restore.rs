use crate::archive::safe_join;
use crate::copier::copy_path;
use crate::manifest::{Manifest, ManifestEntry};
use crate::prompt::{Confirm, Decision, require};
use crate::resolver::Resolver;
use crate::types::BackupTargetSet;
use crate::{Error, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A manifest entry paired with where it goes on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCopy {
    pub entry: ManifestEntry,
    pub destination: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct RestoreReport {
    pub restored: Vec<PathBuf>,
    pub overwritten: Vec<PathBuf>,
    pub undeclared: Vec<ManifestEntry>,
    pub origin_mismatch: bool,
    pub files: u64,
}

/// Entries whose `(type, original_path)` the current targets don't list.
/// Entries with an unknown type are always undeclared.
pub fn undeclared_entries<'a>(
    manifest: &'a Manifest,
    targets: &BackupTargetSet,
) -> Vec<&'a ManifestEntry> {
    manifest
        .files
        .iter()
        .filter(|entry| match entry.storage_category() {
            Ok(category) => !targets.contains(category, &entry.original_path),
            Err(_) => true,
        })
        .collect()
}

/// Resolves every entry's live destination. Fails on the first unknown
/// category or unresolvable path.
pub fn plan_destinations(manifest: &Manifest, resolver: &Resolver) -> Result<Vec<PlannedCopy>> {
    manifest
        .files
        .iter()
        .map(|entry| {
            let category = entry.storage_category()?;
            let destination = resolver.resolve(category, &entry.original_path)?;
            Ok(PlannedCopy {
                entry: entry.clone(),
                destination,
            })
        })
        .collect()
}

/// Planned copies whose destination already exists. A destination that
/// can't be checked for any reason other than not-found counts as existing.
pub fn overwrite_candidates(plan: &[PlannedCopy]) -> Vec<&PlannedCopy> {
    plan.iter()
        .filter(|copy| match fs::symlink_metadata(&copy.destination) {
            Ok(_) => true,
            Err(e) => e.kind() != io::ErrorKind::NotFound,
        })
        .collect()
}

/// Copies each extracted entry onto its destination, overwriting.
pub fn replay(extracted_dir: &Path, plan: &[PlannedCopy]) -> Result<u64> {
    let mut files = 0;
    for copy in plan {
        let source = safe_join(extracted_dir, &copy.entry.archive_path)?;
        files += copy_path(&source, &copy.destination, true)?;
        debug!("Restored {} -> {}", copy.entry.archive_path, copy.destination.display());
    }
    Ok(files)
}

/// Reconciles an extracted snapshot with this machine and copies it back.
///
/// Asks at most one question per finding: origin OS mismatch, undeclared
/// entries, existing destinations. Any "no" stops the restore before the
/// first byte is copied.
pub fn restore(
    extracted_dir: &Path,
    manifest: &Manifest,
    targets: &BackupTargetSet,
    resolver: &Resolver,
    confirm: &mut dyn Confirm,
) -> Result<RestoreReport> {
    if manifest.files.is_empty() {
        return Err(Error::EmptyManifest);
    }

    let mut report = RestoreReport::default();
    let host_os = resolver.host().os.as_str();

    if manifest.os != host_os {
        warn!("Snapshot was taken on {}, restoring on {}", manifest.os, host_os);
        require(
            confirm,
            Decision::OriginMismatch {
                archive_os: manifest.os.clone(),
                host_os: host_os.to_string(),
            },
        )?;
        report.origin_mismatch = true;
    }

    let undeclared = undeclared_entries(manifest, targets);
    if !undeclared.is_empty() {
        warn!("{} snapshot entries are not in the current backup targets", undeclared.len());
        let entries = undeclared
            .iter()
            .map(|entry| format!("{}: {}", entry.category, entry.original_path))
            .collect();
        require(confirm, Decision::UndeclaredEntries { entries })?;
        report.undeclared = undeclared.into_iter().cloned().collect();
    }

    let plan = plan_destinations(manifest, resolver)?;

    let overwritten: Vec<PathBuf> = overwrite_candidates(&plan)
        .into_iter()
        .map(|copy| copy.destination.clone())
        .collect();
    if !overwritten.is_empty() {
        require(
            confirm,
            Decision::Overwrite {
                paths: overwritten.clone(),
            },
        )?;
    }
    report.overwritten = overwritten;

    report.files = replay(extracted_dir, &plan)?;
    report.restored = plan.into_iter().map(|copy| copy.destination).collect();
    info!("Restored {} items ({} files)", report.restored.len(), report.files);
    Ok(report)
}
