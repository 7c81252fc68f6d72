use crate::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// Directory class a backup pattern is rooted under. The tag is written
/// verbatim into the manifest and doubles as the top-level directory name
/// inside the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StorageCategory {
    InstallDir,
    UserHome,
    WinAppdataLocal,
    WinAppdataLocalLow,
    WinAppdataRoaming,
    WinDocuments,
    Absolute,
}

impl StorageCategory {
    /// Declaration order; backups walk the target set in this order.
    pub const ALL: [StorageCategory; 7] = [
        StorageCategory::InstallDir,
        StorageCategory::UserHome,
        StorageCategory::WinAppdataLocal,
        StorageCategory::WinAppdataLocalLow,
        StorageCategory::WinAppdataRoaming,
        StorageCategory::WinDocuments,
        StorageCategory::Absolute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageCategory::InstallDir => "install_dir",
            StorageCategory::UserHome => "user_home",
            StorageCategory::WinAppdataLocal => "win_appdata_local",
            StorageCategory::WinAppdataLocalLow => "win_appdata_locallow",
            StorageCategory::WinAppdataRoaming => "win_appdata_roaming",
            StorageCategory::WinDocuments => "win_documents",
            StorageCategory::Absolute => "absolute",
        }
    }
}

impl fmt::Display for StorageCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        StorageCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::UnsupportedStorageCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WinFolder {
    Local,
    LocalLow,
    Roaming,
    Documents,
}

impl WinFolder {
    pub fn dir_name(&self) -> &'static str {
        match self {
            WinFolder::Local => "Local",
            WinFolder::LocalLow => "LocalLow",
            WinFolder::Roaming => "Roaming",
            WinFolder::Documents => "Documents",
        }
    }

    pub fn is_appdata(&self) -> bool {
        !matches!(self, WinFolder::Documents)
    }
}

/// How the game runs relative to the host OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnvironment {
    Native,
    Wine,
    Proton,
}

impl RuntimeEnvironment {
    /// Unset or empty means native.
    pub fn parse(value: Option<&str>) -> Result<Self> {
        match value.map(str::trim) {
            None | Some("") | Some("native") => Ok(RuntimeEnvironment::Native),
            Some("wine") => Ok(RuntimeEnvironment::Wine),
            Some("proton") => Ok(RuntimeEnvironment::Proton),
            Some(other) => Err(Error::UnknownRuntimeEnvironment(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RuntimeEnvironment::Native => "native",
            RuntimeEnvironment::Wine => "wine",
            RuntimeEnvironment::Proton => "proton",
        }
    }
}

/// Per-game backup targets: one ordered pattern list per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupTargetSet {
    pub install_dir: Vec<String>,
    pub user_home: Vec<String>,
    pub win_appdata_local: Vec<String>,
    pub win_appdata_locallow: Vec<String>,
    pub win_appdata_roaming: Vec<String>,
    pub win_documents: Vec<String>,
    pub absolute: Vec<String>,
}

impl BackupTargetSet {
    pub fn patterns(&self, category: StorageCategory) -> &[String] {
        match category {
            StorageCategory::InstallDir => &self.install_dir,
            StorageCategory::UserHome => &self.user_home,
            StorageCategory::WinAppdataLocal => &self.win_appdata_local,
            StorageCategory::WinAppdataLocalLow => &self.win_appdata_locallow,
            StorageCategory::WinAppdataRoaming => &self.win_appdata_roaming,
            StorageCategory::WinDocuments => &self.win_documents,
            StorageCategory::Absolute => &self.absolute,
        }
    }

    pub fn patterns_mut(&mut self, category: StorageCategory) -> &mut Vec<String> {
        match category {
            StorageCategory::InstallDir => &mut self.install_dir,
            StorageCategory::UserHome => &mut self.user_home,
            StorageCategory::WinAppdataLocal => &mut self.win_appdata_local,
            StorageCategory::WinAppdataLocalLow => &mut self.win_appdata_locallow,
            StorageCategory::WinAppdataRoaming => &mut self.win_appdata_roaming,
            StorageCategory::WinDocuments => &mut self.win_documents,
            StorageCategory::Absolute => &mut self.absolute,
        }
    }

    /// Every (category, pattern) pair in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (StorageCategory, &str)> + '_ {
        StorageCategory::ALL.into_iter().flat_map(move |category| {
            self.patterns(category)
                .iter()
                .map(move |pattern| (category, pattern.as_str()))
        })
    }

    pub fn len(&self) -> usize {
        StorageCategory::ALL
            .into_iter()
            .map(|c| self.patterns(c).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, category: StorageCategory, pattern: &str) -> bool {
        self.patterns(category).iter().any(|p| p == pattern)
    }

    /// Builder used mostly by tests.
    pub fn with(mut self, category: StorageCategory, pattern: impl Into<String>) -> Self {
        self.patterns_mut(category).push(pattern.into());
        self
    }
}

/// YAML scalars written either as a string or a bare integer (`app_id: 123`,
/// `version: 1`).
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Int(i64),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Int(i) => i.to_string(),
        }
    }
}

pub(crate) fn scalar_string<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<String, D::Error> {
    Scalar::deserialize(d).map(Scalar::into_string)
}

pub(crate) fn optional_scalar_string<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_string))
}
