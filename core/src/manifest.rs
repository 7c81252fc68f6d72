use crate::types::{StorageCategory, scalar_string};
use crate::{Error, Result};
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

pub const MANIFEST_VERSION: &str = "1";
pub const MANIFEST_FILE: &str = "metadata.yaml";

/// One backed-up target as recorded in `metadata.yaml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub modified_at: DateTime<Utc>,
    pub archive_path: String,
    /// Raw category tag. Kept as a string so manifests written by a newer
    /// tool still load and their unknown tags can be reported.
    #[serde(rename = "type")]
    pub category: String,
    pub original_path: String,
}

impl ManifestEntry {
    pub fn new(
        category: StorageCategory,
        original_path: impl Into<String>,
        archive_path: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        Self {
            modified_at,
            archive_path: archive_path.into(),
            category: category.as_str().to_string(),
            original_path: original_path.into(),
        }
    }

    pub fn storage_category(&self) -> Result<StorageCategory> {
        self.category.parse()
    }
}

/// Description of one snapshot, embedded at the archive root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(deserialize_with = "scalar_string")]
    pub version: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub tool_version: String,
    pub os: String,
    #[serde(default)]
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn new(name: impl Into<String>, files: Vec<ManifestEntry>) -> Self {
        Self {
            version: MANIFEST_VERSION.to_string(),
            name: name.into(),
            created_at: Utc::now().trunc_subsecs(0),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            files,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.version != MANIFEST_VERSION {
            return Err(Error::UnsupportedManifestVersion {
                found: self.version.clone(),
                supported: MANIFEST_VERSION.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for entry in &self.files {
            if !seen.insert(entry.archive_path.as_str()) {
                return Err(Error::DuplicateArchivePath {
                    archive_path: entry.archive_path.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Parses a manifest, checking the version tag before the rest of the
    /// document so that a newer layout reports the version, not a field error.
    pub fn from_yaml(text: &str) -> Result<Self> {
        let value: serde_yaml::Value = serde_yaml::from_str(text)?;
        let found = match value.get("version") {
            Some(serde_yaml::Value::String(v)) => v.clone(),
            Some(serde_yaml::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        if found != MANIFEST_VERSION {
            return Err(Error::UnsupportedManifestVersion {
                found,
                supported: MANIFEST_VERSION.to_string(),
            });
        }

        let manifest: Manifest = serde_yaml::from_value(value)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Writes `metadata.yaml` into `dir` and returns its path.
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        self.validate()?;
        let path = dir.join(MANIFEST_FILE);
        fs::write(&path, self.to_yaml()?).map_err(|e| Error::io_at(&path, e))?;
        tracing::debug!("Wrote manifest with {} entries to {}", self.files.len(), path.display());
        Ok(path)
    }

    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let text = match fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ManifestNotFound(dir.to_path_buf()));
            }
            Err(e) => return Err(Error::io_at(&path, e)),
        };
        Self::from_yaml(&text)
    }

    /// Entry count per category tag, for listings.
    pub fn category_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for entry in &self.files {
            *counts.entry(entry.category.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Modification times are stored at second precision.
pub fn to_manifest_time(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time).trunc_subsecs(0)
}
