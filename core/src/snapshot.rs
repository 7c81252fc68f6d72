//! Backup, restore and clean workflows for one game.

use crate::config::GameConfig;
use crate::copier::copy_to_staging;
use crate::health::{self, SnapshotCondition};
use crate::manifest::Manifest;
use crate::prompt::Confirm;
use crate::repository::Repository;
use crate::resolver::Resolver;
use crate::restore::{self, RestoreReport};
use crate::{Error, Result, archive};
use chrono::Local;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct BackupOutcome {
    pub archive: PathBuf,
    pub manifest: Manifest,
    pub archive_entries: usize,
}

#[derive(Debug, Clone)]
pub struct CleanOutcome {
    pub condition: SnapshotCondition,
    pub removed: usize,
}

/// Copies the game's targets into a staging dir, writes the manifest and
/// packs everything into `<name>_<timestamp>.zip` in the repository.
///
/// The staging dir is removed whether or not the backup succeeds.
pub fn create_snapshot(
    repo: &Repository,
    game: &GameConfig,
    resolver: &Resolver,
    confirm: &mut dyn Confirm,
) -> Result<BackupOutcome> {
    if game.backup_targets.is_empty() {
        return Err(Error::EmptyBackupTargets {
            game: game.name.clone(),
        });
    }

    repo.ensure(confirm)?;
    let staging = repo.staging_dir()?;
    info!("Staging {} backup targets for {}", game.backup_targets.len(), repo.name());

    let entries = copy_to_staging(staging.path(), &game.backup_targets, resolver)?;
    let manifest = Manifest::new(repo.name(), entries);
    manifest.save(staging.path())?;

    let archive_path = repo.archive_path(Local::now());
    if archive_path.exists() {
        return Err(Error::io_at(
            &archive_path,
            io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a snapshot with this timestamp already exists",
            ),
        ));
    }
    let archive_entries = match archive::compress(staging.path(), &archive_path) {
        Ok(count) => count,
        Err(e) => {
            if let Err(cleanup) = fs::remove_file(&archive_path) {
                warn!("Could not remove partial archive {}: {}", archive_path.display(), cleanup);
            }
            return Err(e);
        }
    };

    let staged = staging.path().to_path_buf();
    staging.close().map_err(|e| Error::io_at(staged, e))?;

    info!("Snapshot written to {}", archive_path.display());
    Ok(BackupOutcome {
        archive: archive_path,
        manifest,
        archive_entries,
    })
}

/// Extracts `archive_path`, reconciles it with the current config and this
/// machine, then copies every entry back to its live location.
pub fn restore_snapshot(
    repo: &Repository,
    archive_path: &Path,
    game: &GameConfig,
    resolver: &Resolver,
    confirm: &mut dyn Confirm,
) -> Result<RestoreReport> {
    if game.backup_targets.is_empty() {
        return Err(Error::EmptyBackupTargets {
            game: game.name.clone(),
        });
    }
    if !archive::is_zip_file(archive_path)? {
        return Err(Error::NotAnArchive(archive_path.to_path_buf()));
    }

    let staging = repo.staging_dir()?;
    archive::extract(archive_path, staging.path())?;
    let manifest = Manifest::load(staging.path())?;
    info!(
        "Restoring '{}' taken {} on {} ({} entries)",
        manifest.name,
        manifest.created_at,
        manifest.os,
        manifest.files.len()
    );

    restore::restore(staging.path(), &manifest, &game.backup_targets, resolver, confirm)
}

/// Deletes the contents of the game's install dir behind the backup-health
/// gate, offering a fresh snapshot first when the latest one is missing or
/// stale.
pub fn clean_game(
    repo: &Repository,
    game: &GameConfig,
    resolver: &Resolver,
    max_age: Duration,
    confirm: &mut dyn Confirm,
) -> Result<CleanOutcome> {
    let condition = health::gate(repo, &game.install_dir, max_age, confirm, |confirm| {
        create_snapshot(repo, game, resolver, confirm).map(|outcome| outcome.archive)
    })?;
    let removed = clean_install_dir(&game.install_dir)?;
    Ok(CleanOutcome { condition, removed })
}

/// Removes everything inside `install_dir` but keeps the directory.
/// Returns the number of top-level entries removed.
pub fn clean_install_dir(install_dir: &Path) -> Result<usize> {
    if install_dir.as_os_str().is_empty() || install_dir.parent().is_none() {
        return Err(Error::Configuration(format!(
            "refusing to clean '{}'",
            install_dir.display()
        )));
    }

    let mut removed = 0;
    for entry in fs::read_dir(install_dir).map_err(|e| Error::io_at(install_dir, e))? {
        let entry = entry.map_err(|e| Error::io_at(install_dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| Error::io_at(&path, e))?;
        if file_type.is_dir() {
            fs::remove_dir_all(&path).map_err(|e| Error::io_at(&path, e))?;
        } else {
            fs::remove_file(&path).map_err(|e| Error::io_at(&path, e))?;
        }
        removed += 1;
    }

    info!("Removed {} entries from {}", removed, install_dir.display());
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::DEFAULT_MAX_AGE;
    use crate::manifest::MANIFEST_FILE;
    use crate::prompt::testing::Scripted;
    use crate::prompt::{AssumeYes, Decision};
    use crate::resolver::HostEnv;
    use crate::types::{BackupTargetSet, StorageCategory};
    use chrono::{TimeZone, Utc};
    use std::fs::File;
    use std::time::SystemTime;
    use tempfile::TempDir;

    struct World {
        root: TempDir,
        repo: Repository,
        install: PathBuf,
        home: PathBuf,
    }

    impl World {
        fn new() -> Self {
            let root = TempDir::new().unwrap();
            let install = root.path().join("game");
            let home = root.path().join("alice");
            fs::create_dir_all(&install).unwrap();
            fs::create_dir_all(&home).unwrap();
            let repo = Repository::new(root.path().join("backups"), "foo");
            Self {
                root,
                repo,
                install,
                home,
            }
        }

        fn host(&self) -> HostEnv {
            HostEnv {
                os: std::env::consts::OS.to_string(),
                home_dir: Some(self.home.clone()),
                ..Default::default()
            }
        }

        fn game(&self, targets: BackupTargetSet) -> GameConfig {
            GameConfig {
                name: "foo".into(),
                install_dir: self.install.clone(),
                backup_targets: targets,
                ..Default::default()
            }
        }

        fn resolver(&self, game: &GameConfig) -> Resolver {
            Resolver::new(&game.install_dir, self.host()).with_runtime_env(game.runtime_env.clone())
        }
    }

    fn save_dat() -> BackupTargetSet {
        BackupTargetSet::default().with(StorageCategory::InstallDir, "save.dat")
    }

    #[test]
    fn test_backup_scenario() {
        let world = World::new();
        let save = world.install.join("save.dat");
        fs::write(&save, b"\x00\x01slot").unwrap();
        let mtime = SystemTime::UNIX_EPOCH + Duration::from_secs(1_709_296_200);
        File::options().write(true).open(&save).unwrap().set_modified(mtime).unwrap();

        let game = world.game(save_dat());
        let mut confirm = Scripted::new(&[true]);
        let outcome =
            create_snapshot(&world.repo, &game, &world.resolver(&game), &mut confirm).unwrap();
        assert!(matches!(confirm.asked.as_slice(), [Decision::CreateSnapshotDir { .. }]));
        // install_dir/, install_dir/save.dat, metadata.yaml
        assert_eq!(outcome.archive_entries, 3);

        let manifest = archive::read_manifest(&outcome.archive).unwrap();
        assert_eq!(manifest.name, "foo");
        assert_eq!(manifest.files.len(), 1);
        let entry = &manifest.files[0];
        assert_eq!(entry.archive_path, "install_dir/save.dat");
        assert_eq!(entry.category, "install_dir");
        assert_eq!(entry.original_path, "save.dat");
        assert_eq!(entry.modified_at, Utc.timestamp_opt(1_709_296_200, 0).unwrap());

        let out = world.root.path().join("out");
        archive::extract(&outcome.archive, &out).unwrap();
        assert!(out.join(MANIFEST_FILE).is_file());
        assert_eq!(fs::read(out.join("install_dir/save.dat")).unwrap(), b"\x00\x01slot");

        let listed = world.repo.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, outcome.archive);
        // staging is gone
        assert_eq!(fs::read_dir(world.repo.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_backup_leaves_no_staging() {
        let world = World::new();
        let targets = BackupTargetSet::default().with(StorageCategory::InstallDir, "missing.sav");
        let game = world.game(targets);

        let resolver = world.resolver(&game);
        let err = create_snapshot(&world.repo, &game, &resolver, &mut AssumeYes).unwrap_err();
        assert!(matches!(err, Error::SourceNotFound { .. }));
        assert_eq!(fs::read_dir(world.repo.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_targets_rejected() {
        let world = World::new();
        let game = world.game(BackupTargetSet::default());
        let resolver = world.resolver(&game);
        assert!(matches!(
            create_snapshot(&world.repo, &game, &resolver, &mut AssumeYes),
            Err(Error::EmptyBackupTargets { .. })
        ));
        assert!(!world.repo.path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_round_trip_every_category() {
        let world = World::new();
        let absolute = world.root.path().join("srv/foo");
        fs::create_dir_all(&absolute).unwrap();

        let targets = BackupTargetSet::default()
            .with(StorageCategory::InstallDir, "Saved")
            .with(StorageCategory::UserHome, ".config/foo.ini")
            .with(StorageCategory::WinAppdataLocal, "Foo/local.sav")
            .with(StorageCategory::WinAppdataLocalLow, "Studio/Foo")
            .with(StorageCategory::WinAppdataRoaming, "Foo/roaming.cfg")
            .with(StorageCategory::WinDocuments, "My Games/Foo/profile.dat")
            .with(StorageCategory::Absolute, absolute.join("server.cfg").to_string_lossy());
        let mut game = world.game(targets.clone());
        game.runtime_env = Some("wine".into());
        let resolver = world.resolver(&game);

        // (target root, file inside it, content)
        let mut originals = Vec::new();
        for (i, (category, pattern)) in targets.iter().enumerate() {
            let root = resolver.resolve(category, pattern).unwrap();
            let is_tree = matches!(
                category,
                StorageCategory::InstallDir | StorageCategory::WinAppdataLocalLow
            );
            let file = if is_tree { root.join("nested/data.bin") } else { root.clone() };
            fs::create_dir_all(file.parent().unwrap()).unwrap();
            fs::write(&file, format!("payload {i}")).unwrap();
            originals.push((root, file, format!("payload {i}")));
        }
        let wine_local = world.home.join(".wine/drive_c/users/alice/AppData/Local");
        assert!(originals[2].1.starts_with(wine_local));

        let outcome = create_snapshot(&world.repo, &game, &resolver, &mut AssumeYes).unwrap();
        assert_eq!(outcome.manifest.files.len(), 7);

        for (root, _, _) in &originals {
            if root.is_dir() {
                fs::remove_dir_all(root).unwrap();
            } else {
                fs::remove_file(root).unwrap();
            }
        }

        let mut confirm = Scripted::new(&[]);
        let report = restore_snapshot(&world.repo, &outcome.archive, &game, &resolver, &mut confirm)
            .unwrap();
        assert!(confirm.asked.is_empty());
        assert_eq!(report.restored.len(), 7);
        for (_, file, content) in &originals {
            assert_eq!(fs::read_to_string(file).unwrap(), *content, "{}", file.display());
        }
    }

    #[test]
    fn test_restore_rejects_non_archive() {
        let world = World::new();
        let bogus = world.root.path().join("foo_20240101_000000.zip");
        fs::write(&bogus, b"plain text").unwrap();
        let game = world.game(save_dat());

        assert!(matches!(
            restore_snapshot(&world.repo, &bogus, &game, &world.resolver(&game), &mut AssumeYes),
            Err(Error::NotAnArchive(_))
        ));
    }

    #[test]
    fn test_restore_empty_manifest() {
        let world = World::new();
        let staging = world.root.path().join("staging");
        fs::create_dir_all(&staging).unwrap();
        Manifest::new("foo", Vec::new()).save(&staging).unwrap();
        let archive_path = world.root.path().join("empty.zip");
        archive::compress(&staging, &archive_path).unwrap();

        let game = world.game(save_dat());
        let mut confirm = Scripted::new(&[]);
        let resolver = world.resolver(&game);
        let err = restore_snapshot(&world.repo, &archive_path, &game, &resolver, &mut confirm)
            .unwrap_err();
        assert!(matches!(err, Error::EmptyManifest));
        assert!(confirm.asked.is_empty());
    }

    #[test]
    fn test_clean_install_dir_keeps_dir() {
        let world = World::new();
        fs::create_dir_all(world.install.join("Saved/deep")).unwrap();
        fs::write(world.install.join("Saved/deep/a"), b"a").unwrap();
        fs::write(world.install.join("game.exe"), b"MZ").unwrap();

        assert_eq!(clean_install_dir(&world.install).unwrap(), 2);
        assert!(world.install.is_dir());
        assert_eq!(fs::read_dir(&world.install).unwrap().count(), 0);
        assert!(clean_install_dir(Path::new("/")).is_err());
    }

    #[test]
    fn test_clean_game_takes_snapshot_first() {
        let world = World::new();
        fs::write(world.install.join("save.dat"), b"slot").unwrap();
        let game = world.game(save_dat());
        let resolver = world.resolver(&game);

        // take backup, create repo dir, confirm clean
        let mut confirm = Scripted::new(&[true, true, true]);
        let outcome =
            clean_game(&world.repo, &game, &resolver, DEFAULT_MAX_AGE, &mut confirm).unwrap();

        assert!(outcome.condition.is_healthy());
        assert_eq!(outcome.removed, 1);
        assert!(matches!(
            confirm.asked.as_slice(),
            [
                Decision::BackupBeforeClean { .. },
                Decision::CreateSnapshotDir { .. },
                Decision::ConfirmClean { healthy: true, .. }
            ]
        ));
        assert_eq!(world.repo.list().unwrap().len(), 1);
        assert!(!world.install.join("save.dat").exists());
    }
}
