use crate::manifest::{ManifestEntry, to_manifest_time};
use crate::resolver::Resolver;
use crate::types::{BackupTargetSet, StorageCategory};
use crate::{Error, Result};
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path};
use tracing::{debug, info};
use walkdir::WalkDir;

/// `<category>/<pattern>` with `/` separators. Root and drive prefixes are
/// dropped, so `/srv/x` under `absolute` becomes `absolute/srv/x`.
pub fn archive_path_for(category: StorageCategory, pattern: &str) -> String {
    let parts: Vec<String> = Path::new(pattern)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        category.as_str().to_string()
    } else {
        format!("{}/{}", category.as_str(), parts.join("/"))
    }
}

/// Copies every target into `staging_dir/<archive_path>` and returns one
/// manifest entry per target, in declaration order.
///
/// A missing source aborts the whole copy. Files already copied stay in the
/// staging dir; the caller owns cleanup.
pub fn copy_to_staging(
    staging_dir: &Path,
    targets: &BackupTargetSet,
    resolver: &Resolver,
) -> Result<Vec<ManifestEntry>> {
    let mut seen = HashSet::new();
    for (category, pattern) in targets.iter() {
        let archive_path = archive_path_for(category, pattern);
        if !seen.insert(archive_path.clone()) {
            return Err(Error::DuplicateArchivePath { archive_path });
        }
    }

    let mut entries = Vec::with_capacity(targets.len());
    for (category, pattern) in targets.iter() {
        let source = resolver.resolve(category, pattern)?;
        let metadata = match fs::metadata(&source) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(Error::SourceNotFound {
                    category: category.to_string(),
                    pattern: pattern.to_string(),
                    path: source,
                });
            }
            Err(e) => return Err(Error::io_at(&source, e)),
        };

        let archive_path = archive_path_for(category, pattern);
        let dest = staging_dir.join(&archive_path);
        let files = copy_path(&source, &dest, false)?;
        let modified = metadata.modified().map_err(|e| Error::io_at(&source, e))?;

        debug!("Copied {} ({} files) -> {}", source.display(), files, archive_path);
        entries.push(ManifestEntry::new(
            category,
            pattern,
            archive_path,
            to_manifest_time(modified),
        ));
    }

    info!("Staged {} backup targets", entries.len());
    Ok(entries)
}

/// Copies a file or a whole directory tree and returns the number of files
/// written. Without `overwrite`, an existing destination file is an error.
pub fn copy_path(source: &Path, dest: &Path, overwrite: bool) -> Result<u64> {
    let metadata = fs::metadata(source).map_err(|e| Error::io_at(source, e))?;
    if !metadata.is_dir() {
        copy_file(source, dest, overwrite)?;
        return Ok(1);
    }

    let mut files = 0;
    for entry in WalkDir::new(source).follow_links(true) {
        let entry = entry?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| Error::io_at(&target, e))?;
        } else {
            copy_file(entry.path(), &target, overwrite)?;
            files += 1;
        }
    }
    Ok(files)
}

fn copy_file(source: &Path, dest: &Path, overwrite: bool) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
    }
    if !overwrite && dest.exists() {
        return Err(Error::io_at(
            dest,
            io::Error::new(io::ErrorKind::AlreadyExists, "destination already exists"),
        ));
    }
    fs::copy(source, dest).map_err(|e| Error::io_at(source, e))?;
    Ok(())
}
