use crate::resolver::{HostEnv, check_pattern};
use crate::types::{BackupTargetSet, RuntimeEnvironment, optional_scalar_string};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".archon.yaml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub archon: Option<ArchonConfig>,
    #[serde(default)]
    pub games: BTreeMap<String, GameConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchonConfig {
    pub backup_dir: Option<PathBuf>,
    /// AppData root; `Local`, `LocalLow` and `Roaming` live under it.
    pub appdata_dir: Option<PathBuf>,
    pub document_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    /// Snapshot name; falls back to the game's key.
    pub name: String,
    pub install_dir: PathBuf,
    pub runtime_env: Option<String>,
    pub steam: Option<SteamConfig>,
    pub backup_targets: BackupTargetSet,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SteamConfig {
    #[serde(default, deserialize_with = "optional_scalar_string")]
    pub app_id: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
}

impl GameConfig {
    pub fn steam_app_id(&self) -> Option<&str> {
        self.steam
            .as_ref()
            .and_then(|s| s.app_id.as_deref())
            .filter(|id| !id.trim().is_empty())
    }

    pub fn steam_platform(&self) -> Option<&str> {
        self.steam.as_ref().and_then(|s| s.platform.as_deref())
    }
}

impl Config {
    /// Loads and expands a config file using the process environment.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::io_at(path, e))?;
        let home = directories::BaseDirs::new().map(|b| b.home_dir().to_path_buf());
        let config = Self::from_yaml(&text, home.as_deref(), |name| std::env::var(name).ok())?;
        tracing::debug!("Loaded config from {} ({} games)", path.display(), config.games.len());
        Ok(config)
    }

    /// Parses YAML and expands `~` and `$VAR` in path fields with the given
    /// home directory and variable lookup.
    pub fn from_yaml<F>(text: &str, home: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if text.trim().is_empty() {
            return Err(Error::Configuration("config file is empty".into()));
        }
        let mut config: Config = serde_yaml::from_str(text)?;
        config.expand(home, &lookup)?;
        Ok(config)
    }

    fn expand(
        &mut self,
        home: Option<&Path>,
        lookup: &dyn Fn(&str) -> Option<String>,
    ) -> Result<()> {
        if let Some(archon) = self.archon.as_mut() {
            for dir in [&mut archon.backup_dir, &mut archon.appdata_dir, &mut archon.document_dir] {
                if let Some(path) = dir.as_mut() {
                    *path = expand_path(&path.to_string_lossy(), home, lookup)?;
                }
            }
        }

        for (key, game) in self.games.iter_mut() {
            if game.name.trim().is_empty() {
                game.name = key.clone();
            }
            if !game.install_dir.as_os_str().is_empty() {
                game.install_dir = expand_path(&game.install_dir.to_string_lossy(), home, lookup)?;
            }
        }
        Ok(())
    }

    /// Finds the config file: `explicit` (from `--config` or `ARCHON_CONFIG`)
    /// must exist; otherwise `./.archon.yaml`, `~/.archon.yaml` and the
    /// platform config dir are tried in that order.
    pub fn discover(explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = explicit {
            return if path.is_file() {
                Ok(path.to_path_buf())
            } else {
                Err(Error::ConfigNotFound {
                    searched: path.display().to_string(),
                })
            };
        }

        let candidates = Self::candidates();
        candidates
            .iter()
            .find(|path| path.is_file())
            .cloned()
            .ok_or_else(|| Error::ConfigNotFound {
                searched: candidates
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from(CONFIG_FILE_NAME)];
        if let Some(base) = directories::BaseDirs::new() {
            candidates.push(base.home_dir().join(CONFIG_FILE_NAME));
        }
        if let Some(project) = directories::ProjectDirs::from("", "", "archon") {
            candidates.push(project.config_dir().join("config.yaml"));
        }
        candidates
    }

    pub fn archon(&self) -> Result<&ArchonConfig> {
        self.archon
            .as_ref()
            .ok_or_else(|| Error::Configuration("the 'archon' section is missing".into()))
    }

    pub fn game(&self, key: &str) -> Result<&GameConfig> {
        self.games
            .get(key)
            .ok_or_else(|| Error::GameNotFound { key: key.to_string() })
    }

    /// Every problem `check-config` reports, in a stable order.
    pub fn check(&self, host: &HostEnv) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        match &self.archon {
            None => issues.push(ConfigIssue::error("config", "the 'archon' section is missing")),
            Some(archon) => check_archon(archon, &mut issues),
        }
        if self.games.is_empty() {
            issues.push(ConfigIssue::error("config", "no games are configured"));
        }
        for (key, game) in &self.games {
            check_game(key, game, host, &mut issues);
        }
        issues
    }
}

/// Checks the fields a backup, restore or clean can't run without.
pub fn validate_for_snapshot(archon: &ArchonConfig, game: &GameConfig) -> Result<()> {
    if archon.backup_dir.as_ref().is_none_or(|dir| dir.as_os_str().is_empty()) {
        return Err(Error::Configuration("archon.backup_dir is not set".into()));
    }
    if game.install_dir.as_os_str().is_empty() {
        return Err(Error::Configuration(format!("install_dir is not set for '{}'", game.name)));
    }
    if game.backup_targets.is_empty() {
        return Err(Error::EmptyBackupTargets {
            game: game.name.clone(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigIssue {
    pub severity: Severity,
    /// `config`, `archon` or `game: <key>`
    pub scope: String,
    pub message: String,
}

impl ConfigIssue {
    fn error(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            scope: scope.into(),
            message: message.into(),
        }
    }

    fn warning(scope: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            scope: scope.into(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.scope, self.message)
    }
}

fn check_archon(archon: &ArchonConfig, issues: &mut Vec<ConfigIssue>) {
    match &archon.backup_dir {
        None => issues.push(ConfigIssue::error("archon", "backup_dir is not set")),
        Some(dir) if !dir.exists() => issues.push(ConfigIssue::warning(
            "archon",
            format!(
                "backup_dir {} does not exist; backup creates it on first use",
                dir.display()
            ),
        )),
        Some(_) => {}
    }

    let overrides = [
        ("appdata_dir", &archon.appdata_dir),
        ("document_dir", &archon.document_dir),
    ];
    for (field, dir) in overrides {
        if let Some(dir) = dir {
            if !dir.exists() {
                issues.push(ConfigIssue::error(
                    "archon",
                    format!("{field} {} is set but does not exist", dir.display()),
                ));
            }
        }
    }
}

fn check_game(key: &str, game: &GameConfig, host: &HostEnv, issues: &mut Vec<ConfigIssue>) {
    let scope = format!("game: {key}");

    if game.install_dir.as_os_str().is_empty() {
        issues.push(ConfigIssue::error(&scope, "install_dir is not set"));
    } else if !game.install_dir.exists() {
        issues.push(ConfigIssue::error(
            &scope,
            format!("install_dir {} does not exist", game.install_dir.display()),
        ));
    }

    if game.backup_targets.is_empty() {
        issues.push(ConfigIssue::error(&scope, "backup_targets is empty"));
    }
    for (category, pattern) in game.backup_targets.iter() {
        if let Err(e) = check_pattern(category, pattern) {
            issues.push(ConfigIssue::error(&scope, e.to_string()));
        }
    }

    let runtime = match RuntimeEnvironment::parse(game.runtime_env.as_deref()) {
        Ok(runtime) => runtime,
        Err(e) => {
            issues.push(ConfigIssue::error(&scope, e.to_string()));
            return;
        }
    };

    if host.os == "linux" {
        let native = runtime == RuntimeEnvironment::Native;
        match game.steam_platform() {
            Some("windows") if native => issues.push(ConfigIssue::error(
                &scope,
                "a Windows build on Linux needs runtime_env: wine or proton",
            )),
            Some(platform) if platform != "windows" && !native => issues.push(ConfigIssue::error(
                &scope,
                format!(
                    "runtime_env is {} but steam.platform is {platform}; set it to windows",
                    runtime.as_str()
                ),
            )),
            _ => {}
        }
    }

    if runtime == RuntimeEnvironment::Proton
        && game.steam_app_id().is_none()
        && host.steam_compat_data_path.is_none()
    {
        issues.push(ConfigIssue::error(
            &scope,
            "runtime_env is proton but steam.app_id is not set",
        ));
    }
}

/// Expands a leading `~` or `~/` and `$VAR` / `${VAR}` references.
/// `~user` and unset variables are errors.
pub fn expand_path(
    raw: &str,
    home: Option<&Path>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<PathBuf> {
    let expanded = expand_vars(raw, lookup)?;

    let Some(rest) = expanded.strip_prefix('~') else {
        return Ok(PathBuf::from(expanded));
    };
    if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\')) {
        return Err(Error::Configuration(format!(
            "'{raw}': ~user paths are not supported"
        )));
    }
    let home = home.ok_or_else(|| {
        Error::EnvironmentUnavailable(format!("cannot expand '{raw}': home directory is unknown"))
    })?;
    let rest = rest.trim_start_matches(['/', '\\']);
    Ok(if rest.is_empty() {
        home.to_path_buf()
    } else {
        home.join(rest)
    })
}

fn expand_vars(raw: &str, lookup: &dyn Fn(&str) -> Option<String>) -> Result<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let mut name = String::new();
        if chars.peek() == Some(&'{') {
            chars.next();
            let mut closed = false;
            for c in chars.by_ref() {
                if c == '}' {
                    closed = true;
                    break;
                }
                name.push(c);
            }
            if !closed {
                return Err(Error::Configuration(format!("'{raw}': unterminated ${{")));
            }
        } else {
            while let Some(&c) = chars.peek() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                name.push(c);
                chars.next();
            }
        }

        if name.is_empty() {
            out.push('$');
            continue;
        }
        let value = lookup(&name).ok_or_else(|| {
            Error::Configuration(format!("'{raw}': environment variable {name} is not set"))
        })?;
        out.push_str(&value);
    }
    Ok(out)
}
