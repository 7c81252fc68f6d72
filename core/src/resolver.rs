//! Storage-category path resolution.
//!
//! Maps `(category, pattern)` to the live location of a backup target for the
//! configured runtime environment. All host facts come from a [`HostEnv`]
//! value, so the same inputs always produce the same path.

use crate::config::{ArchonConfig, GameConfig};
use crate::types::{RuntimeEnvironment, StorageCategory, WinFolder};
use crate::{Error, Result};
use std::path::{Component, Path, PathBuf};

/// Windows known-folder locations, only populated on a Windows host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownFolders {
    pub local: Option<PathBuf>,
    pub local_low: Option<PathBuf>,
    pub roaming: Option<PathBuf>,
    pub documents: Option<PathBuf>,
}

impl KnownFolders {
    pub fn get(&self, folder: WinFolder) -> Option<&PathBuf> {
        match folder {
            WinFolder::Local => self.local.as_ref(),
            WinFolder::LocalLow => self.local_low.as_ref(),
            WinFolder::Roaming => self.roaming.as_ref(),
            WinFolder::Documents => self.documents.as_ref(),
        }
    }

    fn from_os() -> Self {
        let base = directories::BaseDirs::new();
        let local = base.as_ref().map(|b| b.data_local_dir().to_path_buf());
        // LocalLow has no FOLDERID accessor here; it always sits next to Local.
        let local_low = local
            .as_ref()
            .and_then(|l| l.parent())
            .map(|appdata| appdata.join(WinFolder::LocalLow.dir_name()));
        let roaming = base.as_ref().map(|b| b.data_dir().to_path_buf());
        let documents = directories::UserDirs::new()
            .and_then(|u| u.document_dir().map(Path::to_path_buf));

        Self {
            local,
            local_low,
            roaming,
            documents,
        }
    }
}

/// Host facts the resolver depends on, captured once per invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnv {
    /// `std::env::consts::OS` of the running host (`linux`, `windows`, `macos`, ...).
    pub os: String,
    pub home_dir: Option<PathBuf>,
    /// `WINEPREFIX`
    pub wine_prefix: Option<PathBuf>,
    /// `STEAM_COMPAT_DATA_PATH`, set when Proton is invoked by hand.
    pub steam_compat_data_path: Option<PathBuf>,
    /// `STEAM_ROOT`, or the Steam install found by steamlocate.
    pub steam_root: Option<PathBuf>,
    pub known_folders: KnownFolders,
}

impl HostEnv {
    pub fn detect() -> Self {
        let home_dir = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf());
        let steam_root = env_path("STEAM_ROOT").or_else(|| {
            steamlocate::SteamDir::locate()
                .ok()
                .map(|dir| dir.path().to_path_buf())
        });
        let known_folders = if cfg!(windows) {
            KnownFolders::from_os()
        } else {
            KnownFolders::default()
        };

        let host = Self {
            os: std::env::consts::OS.to_string(),
            home_dir,
            wine_prefix: env_path("WINEPREFIX"),
            steam_compat_data_path: env_path("STEAM_COMPAT_DATA_PATH"),
            steam_root,
            known_folders,
        };
        tracing::debug!(?host, "Detected host environment");
        host
    }

    pub fn is_windows(&self) -> bool {
        self.os == "windows"
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var_os(key)
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Resolves backup target patterns to live filesystem paths for one game.
#[derive(Debug, Clone)]
pub struct Resolver {
    install_dir: PathBuf,
    runtime_env: Option<String>,
    steam_app_id: Option<String>,
    appdata_dir: Option<PathBuf>,
    documents_dir: Option<PathBuf>,
    host: HostEnv,
}

impl Resolver {
    pub fn new(install_dir: impl Into<PathBuf>, host: HostEnv) -> Self {
        Self {
            install_dir: install_dir.into(),
            runtime_env: None,
            steam_app_id: None,
            appdata_dir: None,
            documents_dir: None,
            host,
        }
    }

    pub fn for_game(archon: &ArchonConfig, game: &GameConfig, host: HostEnv) -> Self {
        Self::new(&game.install_dir, host)
            .with_runtime_env(game.runtime_env.clone())
            .with_steam_app_id(game.steam_app_id().map(str::to_string))
            .with_appdata_dir(archon.appdata_dir.clone())
            .with_documents_dir(archon.document_dir.clone())
    }

    pub fn with_runtime_env(mut self, runtime_env: Option<String>) -> Self {
        self.runtime_env = runtime_env;
        self
    }

    pub fn with_steam_app_id(mut self, app_id: Option<String>) -> Self {
        self.steam_app_id = app_id;
        self
    }

    /// AppData root override; `Local`, `LocalLow` and `Roaming` are joined to it.
    pub fn with_appdata_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.appdata_dir = dir;
        self
    }

    /// Documents override, used as-is.
    pub fn with_documents_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.documents_dir = dir;
        self
    }

    pub fn host(&self) -> &HostEnv {
        &self.host
    }

    pub fn resolve(&self, category: StorageCategory, pattern: &str) -> Result<PathBuf> {
        check_pattern(category, pattern)?;

        match category {
            StorageCategory::InstallDir => Ok(self.install_dir.join(pattern)),
            StorageCategory::UserHome => Ok(self.home()?.join(pattern)),
            StorageCategory::Absolute => Ok(PathBuf::from(pattern)),
            StorageCategory::WinAppdataLocal => {
                self.windows_path(category, WinFolder::Local, pattern)
            }
            StorageCategory::WinAppdataLocalLow => {
                self.windows_path(category, WinFolder::LocalLow, pattern)
            }
            StorageCategory::WinAppdataRoaming => {
                self.windows_path(category, WinFolder::Roaming, pattern)
            }
            StorageCategory::WinDocuments => {
                self.windows_path(category, WinFolder::Documents, pattern)
            }
        }
    }

    /// Resolves a raw manifest tag; unknown tags are never guessed.
    pub fn resolve_tag(&self, tag: &str, pattern: &str) -> Result<PathBuf> {
        let category: StorageCategory = tag.parse()?;
        self.resolve(category, pattern)
    }

    fn windows_path(
        &self,
        category: StorageCategory,
        folder: WinFolder,
        pattern: &str,
    ) -> Result<PathBuf> {
        Ok(self.windows_base(category, folder)?.join(pattern))
    }

    /// Base directory of a Windows-style folder for the configured runtime.
    pub fn windows_base(&self, category: StorageCategory, folder: WinFolder) -> Result<PathBuf> {
        if folder.is_appdata() {
            if let Some(root) = &self.appdata_dir {
                return Ok(root.join(folder.dir_name()));
            }
        } else if let Some(documents) = &self.documents_dir {
            return Ok(documents.clone());
        }

        let runtime = RuntimeEnvironment::parse(self.runtime_env.as_deref())?;
        let unsupported = || Error::UnsupportedEnvironment {
            category: category.to_string(),
            runtime: runtime.as_str().to_string(),
            os: self.host.os.clone(),
        };

        match runtime {
            RuntimeEnvironment::Native if self.host.is_windows() => self
                .host
                .known_folders
                .get(folder)
                .cloned()
                .ok_or_else(|| {
                    Error::EnvironmentUnavailable(format!(
                        "Windows known folder '{}' could not be determined",
                        folder.dir_name()
                    ))
                }),
            RuntimeEnvironment::Native => Err(unsupported()),
            RuntimeEnvironment::Wine | RuntimeEnvironment::Proton if self.host.is_windows() => {
                Err(unsupported())
            }
            RuntimeEnvironment::Wine => {
                let home = self.home()?;
                let user = home.file_name().ok_or_else(|| {
                    Error::EnvironmentUnavailable(format!(
                        "cannot derive a user name from home directory {}",
                        home.display()
                    ))
                })?;
                let prefix = self
                    .host
                    .wine_prefix
                    .clone()
                    .unwrap_or_else(|| home.join(".wine"));
                Ok(user_folder(prefix.join("drive_c").join("users").join(user), folder))
            }
            RuntimeEnvironment::Proton => {
                let pfx = match &self.host.steam_compat_data_path {
                    Some(compat_data) => compat_data.join("pfx"),
                    None => {
                        let app_id = self
                            .steam_app_id
                            .as_deref()
                            .map(str::trim)
                            .filter(|id| !id.is_empty())
                            .ok_or_else(|| Error::MissingCompatibilityData {
                                category: category.to_string(),
                            })?;
                        let steam_root = match &self.host.steam_root {
                            Some(root) => root.clone(),
                            None => self.home()?.join(".steam").join("steam"),
                        };
                        steam_root
                            .join("steamapps")
                            .join("compatdata")
                            .join(app_id)
                            .join("pfx")
                    }
                };
                Ok(user_folder(pfx.join("drive_c").join("users").join("steamuser"), folder))
            }
        }
    }

    fn home(&self) -> Result<&Path> {
        self.host
            .home_dir
            .as_deref()
            .ok_or_else(|| {
                Error::EnvironmentUnavailable("home directory could not be determined".into())
            })
    }
}

fn user_folder(user_dir: PathBuf, folder: WinFolder) -> PathBuf {
    if folder.is_appdata() {
        user_dir.join("AppData").join(folder.dir_name())
    } else {
        user_dir.join(folder.dir_name())
    }
}

/// Relative categories take relative patterns, `absolute` takes absolute
/// ones, and no pattern may climb with `..`.
pub fn check_pattern(category: StorageCategory, pattern: &str) -> Result<()> {
    let invalid = |reason: &str| Error::InvalidPattern {
        category: category.to_string(),
        pattern: pattern.to_string(),
        reason: reason.to_string(),
    };

    if pattern.trim().is_empty() {
        return Err(invalid("pattern is empty"));
    }

    let path = Path::new(pattern);
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(invalid("'..' is not allowed"));
    }

    match category {
        StorageCategory::Absolute if !path.is_absolute() => {
            Err(invalid("must be an absolute path"))
        }
        StorageCategory::Absolute => Ok(()),
        _ if path.has_root() || path.is_absolute() => {
            Err(invalid("must be relative to its base directory"))
        }
        _ => Ok(()),
    }
}
