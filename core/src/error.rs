use std::path::PathBuf;
use thiserror::Error;

/// Coarse grouping of [`Error`] variants, used by callers that only care
/// about how to react (fix config, retry on another machine, give up).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Environment,
    SourceNotFound,
    UnsafeArchive,
    Corruption,
    Cancelled,
    Io,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error at {path}: {source}")]
    IoAt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Config file not found (searched: {searched})")]
    ConfigNotFound { searched: String },

    #[error("Game '{key}' is not defined in the config")]
    GameNotFound { key: String },

    #[error("Game '{game}' has no backup targets")]
    EmptyBackupTargets { game: String },

    #[error("Invalid pattern '{pattern}' for {category}: {reason}")]
    InvalidPattern {
        category: String,
        pattern: String,
        reason: String,
    },

    #[error("Archive path '{archive_path}' is produced by more than one backup target")]
    DuplicateArchivePath { archive_path: String },

    #[error("Proton needs STEAM_COMPAT_DATA_PATH or a steam.app_id to locate the prefix for {category}")]
    MissingCompatibilityData { category: String },

    #[error("Environment unavailable: {0}")]
    EnvironmentUnavailable(String),

    #[error("{category} cannot be resolved for runtime '{runtime}' on {os}")]
    UnsupportedEnvironment {
        category: String,
        runtime: String,
        os: String,
    },

    #[error("Unknown runtime environment: {0}")]
    UnknownRuntimeEnvironment(String),

    #[error("Backup source not found: {category}: {pattern} ({path})")]
    SourceNotFound {
        category: String,
        pattern: String,
        path: PathBuf,
    },

    #[error("Archive entry escapes the destination directory: {entry}")]
    UnsafeArchivePath { entry: String },

    #[error("Archive entry looks like a decompression bomb: {entry} ({reason})")]
    SuspiciousArchiveEntry { entry: String, reason: String },

    #[error("Not a zip archive: {0}")]
    NotAnArchive(PathBuf),

    #[error("metadata.yaml not found in {0}")]
    ManifestNotFound(PathBuf),

    #[error("Unsupported manifest version '{found}' (supported: {supported})")]
    UnsupportedManifestVersion { found: String, supported: String },

    #[error("Manifest lists no files; the archive is probably corrupted or truncated")]
    EmptyManifest,

    #[error("Unsupported storage category: {0}")]
    UnsupportedStorageCategory(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl Error {
    pub fn io_at(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::IoAt {
            path: path.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Configuration(_)
            | Error::ConfigNotFound { .. }
            | Error::GameNotFound { .. }
            | Error::EmptyBackupTargets { .. }
            | Error::InvalidPattern { .. }
            | Error::DuplicateArchivePath { .. }
            | Error::MissingCompatibilityData { .. } => ErrorKind::Configuration,

            Error::EnvironmentUnavailable(_)
            | Error::UnsupportedEnvironment { .. }
            | Error::UnknownRuntimeEnvironment(_) => ErrorKind::Environment,

            Error::SourceNotFound { .. } => ErrorKind::SourceNotFound,

            Error::UnsafeArchivePath { .. }
            | Error::SuspiciousArchiveEntry { .. }
            | Error::NotAnArchive(_) => ErrorKind::UnsafeArchive,

            Error::ManifestNotFound(_)
            | Error::UnsupportedManifestVersion { .. }
            | Error::EmptyManifest
            | Error::UnsupportedStorageCategory(_) => ErrorKind::Corruption,

            Error::Cancelled(_) => ErrorKind::Cancelled,

            Error::Io(_) | Error::IoAt { .. } | Error::Yaml(_) | Error::Zip(_) | Error::Walk(_) => {
                ErrorKind::Io
            }
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_grouping() {
        assert_eq!(Error::EmptyManifest.kind(), ErrorKind::Corruption);
        assert_eq!(
            Error::UnsafeArchivePath { entry: "../x".into() }.kind(),
            ErrorKind::UnsafeArchive
        );
        assert_eq!(
            Error::MissingCompatibilityData { category: "win_documents".into() }.kind(),
            ErrorKind::Configuration
        );
        assert!(Error::Cancelled("restore".into()).is_cancelled());
        assert!(!Error::EmptyManifest.is_cancelled());
    }
}
