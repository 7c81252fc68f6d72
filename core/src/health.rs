use crate::Result;
use crate::prompt::{Confirm, Decision, require};
use crate::repository::Repository;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// How recent a snapshot must be for a clean to go ahead without a second
/// confirmation.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "condition", rename_all = "snake_case")]
pub enum SnapshotCondition {
    DirNotFound,
    NoArchives,
    TooOld { latest: PathBuf, modified: DateTime<Utc> },
    Healthy { latest: PathBuf, modified: DateTime<Utc> },
}

impl SnapshotCondition {
    pub fn is_healthy(&self) -> bool {
        matches!(self, SnapshotCondition::Healthy { .. })
    }

    pub fn describe(&self, max_age: Duration) -> String {
        let hours = max_age.as_secs() / 3600;
        match self {
            SnapshotCondition::DirNotFound => "The snapshot directory does not exist".to_string(),
            SnapshotCondition::NoArchives => "No snapshots have been taken yet".to_string(),
            SnapshotCondition::TooOld { modified, .. } => {
                format!("The latest snapshot ({modified}) is older than {hours} hours")
            }
            SnapshotCondition::Healthy { modified, .. } => {
                format!("A snapshot from the last {hours} hours exists ({modified})")
            }
        }
    }
}

/// Classifies the repository by its newest archive.
pub fn check(
    repo: &Repository,
    now: DateTime<Utc>,
    max_age: Duration,
) -> Result<SnapshotCondition> {
    if !repo.exists() {
        return Ok(SnapshotCondition::DirNotFound);
    }
    let Some(latest) = repo.latest()? else {
        return Ok(SnapshotCondition::NoArchives);
    };

    // an mtime in the future counts as fresh
    let too_old = matches!((now - latest.modified).to_std(), Ok(age) if age > max_age);
    Ok(if too_old {
        SnapshotCondition::TooOld {
            latest: latest.path,
            modified: latest.modified,
        }
    } else {
        SnapshotCondition::Healthy {
            latest: latest.path,
            modified: latest.modified,
        }
    })
}

/// Guards a destructive clean of `install_dir`.
///
/// Without a recent snapshot the operator is offered one first (taken by
/// `backup`), and a clean that still has nothing recent behind it needs a
/// second confirmation. Returns the condition the clean went ahead with.
pub fn gate<F>(
    repo: &Repository,
    install_dir: &Path,
    max_age: Duration,
    confirm: &mut dyn Confirm,
    mut backup: F,
) -> Result<SnapshotCondition>
where
    F: FnMut(&mut dyn Confirm) -> Result<PathBuf>,
{
    let mut condition = check(repo, Utc::now(), max_age)?;

    if !condition.is_healthy() {
        let reason = condition.describe(max_age);
        warn!("{}", reason);
        if confirm.confirm(&Decision::BackupBeforeClean { reason })? {
            let archive = backup(&mut *confirm)?;
            info!("Snapshot written to {}", archive.display());
            condition = check(repo, Utc::now(), max_age)?;
        }
    }

    let healthy = condition.is_healthy();
    require(
        confirm,
        Decision::ConfirmClean {
            install_dir: install_dir.to_path_buf(),
            healthy,
        },
    )?;
    if !healthy {
        require(
            confirm,
            Decision::ConfirmCleanAgain {
                install_dir: install_dir.to_path_buf(),
            },
        )?;
    }
    Ok(condition)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::testing::Scripted;
    use chrono::Local;
    use std::fs::{self, File};
    use std::time::SystemTime;
    use tempfile::TempDir;

    fn write_archive(repo: &Repository, name: &str, age: Duration) -> PathBuf {
        fs::create_dir_all(repo.path()).unwrap();
        let path = repo.path().join(name);
        fs::write(&path, b"PK").unwrap();
        File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(SystemTime::now() - age)
            .unwrap();
        path
    }

    #[test]
    fn test_conditions() {
        let backups = TempDir::new().unwrap();
        let repo = Repository::new(backups.path(), "foo");
        let now = Utc::now();

        assert_eq!(check(&repo, now, DEFAULT_MAX_AGE).unwrap(), SnapshotCondition::DirNotFound);

        fs::create_dir_all(repo.path()).unwrap();
        fs::write(repo.path().join("readme.txt"), b"").unwrap();
        assert_eq!(check(&repo, now, DEFAULT_MAX_AGE).unwrap(), SnapshotCondition::NoArchives);

        write_archive(&repo, "foo_20240101_000000.zip", Duration::from_secs(48 * 3600));
        assert!(matches!(
            check(&repo, now, DEFAULT_MAX_AGE).unwrap(),
            SnapshotCondition::TooOld { .. }
        ));

        let fresh = write_archive(&repo, "foo_20240103_000000.zip", Duration::from_secs(60));
        assert!(matches!(
            check(&repo, now, DEFAULT_MAX_AGE).unwrap(),
            SnapshotCondition::Healthy { ref latest, .. } if *latest == fresh
        ));
    }

    #[test]
    fn test_gate_healthy_asks_once() {
        let backups = TempDir::new().unwrap();
        let repo = Repository::new(backups.path(), "foo");
        write_archive(&repo, "foo_20240103_000000.zip", Duration::from_secs(60));

        let mut confirm = Scripted::new(&[true]);
        let condition = gate(&repo, Path::new("/games/foo"), DEFAULT_MAX_AGE, &mut confirm, |_| {
            panic!("no backup expected")
        })
        .unwrap();
        assert!(condition.is_healthy());
        assert!(matches!(
            confirm.asked.as_slice(),
            [Decision::ConfirmClean { healthy: true, .. }]
        ));
    }

    #[test]
    fn test_gate_takes_offered_backup() {
        let backups = TempDir::new().unwrap();
        let repo = Repository::new(backups.path(), "foo");
        let mut backups_taken = 0;

        let mut confirm = Scripted::new(&[true, true]);
        let condition = gate(&repo, Path::new("/games/foo"), DEFAULT_MAX_AGE, &mut confirm, |_| {
            backups_taken += 1;
            let name = repo.archive_name(Local::now());
            Ok(write_archive(&repo, &name, Duration::ZERO))
        })
        .unwrap();

        assert_eq!(backups_taken, 1);
        assert!(condition.is_healthy());
        assert!(matches!(
            confirm.asked.as_slice(),
            [Decision::BackupBeforeClean { .. }, Decision::ConfirmClean { healthy: true, .. }]
        ));
    }

    #[test]
    fn test_gate_unhealthy_needs_second_confirmation() {
        let backups = TempDir::new().unwrap();
        let repo = Repository::new(backups.path(), "foo");

        let mut confirm = Scripted::new(&[false, true, false]);
        let err = gate(&repo, Path::new("/games/foo"), DEFAULT_MAX_AGE, &mut confirm, |_| {
            panic!("backup was declined")
        })
        .unwrap_err();

        assert!(err.is_cancelled());
        assert!(matches!(
            confirm.asked.as_slice(),
            [
                Decision::BackupBeforeClean { .. },
                Decision::ConfirmClean { healthy: false, .. },
                Decision::ConfirmCleanAgain { .. }
            ]
        ));
    }
}
