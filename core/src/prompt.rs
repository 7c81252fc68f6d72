//! Yes/no decisions the workflows need from an operator.
//!
//! The core never reads stdin. It builds a [`Decision`] and hands it to a
//! [`Confirm`] implementation; the CLI renders it on a terminal, `--yes`
//! uses [`AssumeYes`] and tests script the answers.

use crate::{Error, Result};
use std::io;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    CreateSnapshotDir { path: PathBuf },
    OriginMismatch { archive_os: String, host_os: String },
    /// `type: original_path` of each entry the current config doesn't list.
    UndeclaredEntries { entries: Vec<String> },
    Overwrite { paths: Vec<PathBuf> },
    BackupBeforeClean { reason: String },
    ConfirmClean { install_dir: PathBuf, healthy: bool },
    ConfirmCleanAgain { install_dir: PathBuf },
}

impl Decision {
    pub fn question(&self) -> String {
        match self {
            Decision::CreateSnapshotDir { path } => {
                format!("Snapshot directory {} does not exist. Create it?", path.display())
            }
            Decision::OriginMismatch { archive_os, host_os } => format!(
                "This snapshot was taken on {archive_os} but this machine runs {host_os}. Restore anyway?"
            ),
            Decision::UndeclaredEntries { entries } => format!(
                "The snapshot contains {} item(s) not listed in the current backup targets. Restore them too?",
                entries.len()
            ),
            Decision::Overwrite { paths } => {
                format!("{} existing item(s) will be overwritten. Continue?", paths.len())
            }
            Decision::BackupBeforeClean { reason } => {
                format!("{reason}. Take a snapshot before cleaning?")
            }
            Decision::ConfirmClean { install_dir, .. } => {
                format!("Delete everything inside {}?", install_dir.display())
            }
            Decision::ConfirmCleanAgain { .. } => {
                "There is no recent snapshot to recover from. Are you sure?".to_string()
            }
        }
    }

    /// Lines shown above the question.
    pub fn details(&self) -> Vec<String> {
        match self {
            Decision::UndeclaredEntries { entries } => entries.clone(),
            Decision::Overwrite { paths } => {
                paths.iter().map(|p| p.display().to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Answer taken on an empty reply.
    pub fn default_answer(&self) -> bool {
        match self {
            Decision::OriginMismatch { .. } | Decision::ConfirmCleanAgain { .. } => false,
            Decision::ConfirmClean { healthy, .. } => *healthy,
            _ => true,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Decision::CreateSnapshotDir { .. } => "snapshot directory not created",
            Decision::OriginMismatch { .. } => "snapshot comes from another OS",
            Decision::UndeclaredEntries { .. } => "snapshot contains undeclared items",
            Decision::Overwrite { .. } => "existing files would be overwritten",
            Decision::BackupBeforeClean { .. } => "no snapshot taken before clean",
            Decision::ConfirmClean { .. } | Decision::ConfirmCleanAgain { .. } => {
                "clean not confirmed"
            }
        }
    }
}

pub trait Confirm {
    fn confirm(&mut self, decision: &Decision) -> io::Result<bool>;
}

/// Answers yes to everything (`--yes`).
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeYes;

impl Confirm for AssumeYes {
    fn confirm(&mut self, decision: &Decision) -> io::Result<bool> {
        tracing::debug!("Assuming yes: {}", decision.question());
        Ok(true)
    }
}

/// Asks and turns a "no" into [`Error::Cancelled`].
pub fn require(confirm: &mut dyn Confirm, decision: Decision) -> Result<()> {
    if confirm.confirm(&decision)? {
        Ok(())
    } else {
        Err(Error::Cancelled(decision.label().to_string()))
    }
}

/// `y`/`yes`/`n`/`no` in any case; anything else, including an empty line,
/// falls back to `default`.
pub fn parse_answer(input: &str, default: bool) -> bool {
    match input.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Replays canned answers and records what was asked.
    #[derive(Debug, Default)]
    pub struct Scripted {
        answers: VecDeque<bool>,
        pub asked: Vec<Decision>,
    }

    impl Scripted {
        pub fn new(answers: &[bool]) -> Self {
            Self {
                answers: answers.iter().copied().collect(),
                asked: Vec::new(),
            }
        }
    }

    impl Confirm for Scripted {
        fn confirm(&mut self, decision: &Decision) -> io::Result<bool> {
            self.asked.push(decision.clone());
            self.answers.pop_front().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("unexpected decision: {decision:?}"),
                )
            })
        }
    }
}
