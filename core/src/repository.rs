use crate::prompt::{Confirm, Decision, require};
use crate::{Error, Result};
use chrono::{DateTime, Local, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Timestamp embedded in archive names: `<name>_<YYYYmmdd_HHMMSS>.zip`.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// One snapshot archive found in a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotArchive {
    pub path: PathBuf,
    pub file_name: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
    /// Local time parsed from the file name.
    pub taken_at: NaiveDateTime,
}

/// The per-game snapshot directory.
///
/// Every game gets its own directory under the configured backup dir, named
/// after the game's snapshot name. Archives inside it are named after the
/// game plus the local time they were taken:
///
/// ```text
/// <backup_dir>/
/// └── <name>/
///     ├── <name>_20240301_120000.zip
///     └── <name>_20240302_093015.zip
/// ```
///
/// Anything else in the directory is ignored by [`Repository::list`].
///
/// # Examples
///
/// ```no_run
/// use archon_core::Repository;
/// use archon_core::prompt::AssumeYes;
///
/// # fn main() -> archon_core::Result<()> {
/// let repo = Repository::new("/backups", "foo");
/// repo.ensure(&mut AssumeYes)?;
/// for archive in repo.list()? {
///     println!("{} ({} bytes)", archive.file_name, archive.size);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
    name: String,
}

impl Repository {
    pub fn new(backup_dir: impl AsRef<Path>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            path: backup_dir.as_ref().join(&name),
            name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> bool {
        self.path.is_dir()
    }

    /// Creates the snapshot directory if it is missing.
    ///
    /// # Errors
    ///
    /// * `Error::Cancelled` - the operator declined to create it
    /// * `Error::IoAt` - the directory could not be created
    pub fn ensure(&self, confirm: &mut dyn Confirm) -> Result<()> {
        if self.exists() {
            return Ok(());
        }

        require(
            confirm,
            Decision::CreateSnapshotDir {
                path: self.path.clone(),
            },
        )?;
        fs::create_dir_all(&self.path).map_err(|e| Error::io_at(&self.path, e))?;
        tracing::info!("Created snapshot directory {}", self.path.display());
        Ok(())
    }

    pub fn archive_name(&self, at: DateTime<Local>) -> String {
        format!("{}_{}.zip", self.name, at.format(TIMESTAMP_FORMAT))
    }

    pub fn archive_path(&self, at: DateTime<Local>) -> PathBuf {
        self.path.join(self.archive_name(at))
    }

    /// Parses the timestamp out of an archive file name belonging to this
    /// repository; `None` for anything else.
    pub fn parse_archive_name(&self, file_name: &str) -> Option<NaiveDateTime> {
        let stamp = file_name
            .strip_prefix(self.name.as_str())?
            .strip_prefix('_')?
            .strip_suffix(".zip")?;
        NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()
    }

    /// Snapshot archives, newest first. A missing directory lists as empty.
    pub fn list(&self) -> Result<Vec<SnapshotArchive>> {
        if !self.exists() {
            return Ok(Vec::new());
        }

        let mut archives = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(|e| Error::io_at(&self.path, e))? {
            let entry = entry.map_err(|e| Error::io_at(&self.path, e))?;
            let file_name = entry.file_name().to_string_lossy().into_owned();
            let Some(taken_at) = self.parse_archive_name(&file_name) else {
                continue;
            };
            let metadata = entry.metadata().map_err(|e| Error::io_at(entry.path(), e))?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata.modified().map_err(|e| Error::io_at(entry.path(), e))?;

            archives.push(SnapshotArchive {
                path: entry.path(),
                file_name,
                size: metadata.len(),
                modified: modified.into(),
                taken_at,
            });
        }

        archives.sort_by(|a, b| {
            b.modified
                .cmp(&a.modified)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(archives)
    }

    pub fn latest(&self) -> Result<Option<SnapshotArchive>> {
        Ok(self.list()?.into_iter().next())
    }

    /// A scratch directory, removed when dropped. Lives inside the
    /// repository when it exists, in the system temp dir otherwise.
    pub fn staging_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(".archon-staging-");
        if self.exists() {
            builder.tempdir_in(&self.path).map_err(|e| Error::io_at(&self.path, e))
        } else {
            builder.tempdir().map_err(Error::Io)
        }
    }
}
