pub mod backup;
pub mod check_config;
pub mod clean;
pub mod restore;
pub mod show;
pub mod snapshots;

use crate::Cli;
use crate::prompt::TerminalConfirm;
use anyhow::{Context, Result, anyhow};
use archon_core::config::validate_for_snapshot;
use archon_core::prompt::{AssumeYes, Confirm};
use archon_core::{Config, GameConfig, HostEnv, Repository, Resolver};
use clap::ValueEnum;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
}

pub fn load_config(cli: &Cli) -> Result<(PathBuf, Config)> {
    let path = Config::discover(cli.config.as_deref())?;
    info!("Using config: {}", path.display());
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    Ok((path, config))
}

/// Everything a per-game command needs, validated up front.
pub struct GameContext {
    pub game: GameConfig,
    pub repo: Repository,
    pub resolver: Resolver,
}

impl GameContext {
    pub fn load(cli: &Cli, key: &str) -> Result<Self> {
        let (_, config) = load_config(cli)?;
        let archon = config.archon()?.clone();
        let game = config.game(key)?.clone();
        validate_for_snapshot(&archon, &game)
            .with_context(|| format!("Game '{key}' is not ready"))?;

        let backup_dir = archon
            .backup_dir
            .clone()
            .ok_or_else(|| anyhow!("archon.backup_dir is not set"))?;
        let resolver = Resolver::for_game(&archon, &game, HostEnv::detect());
        let repo = Repository::new(backup_dir, &game.name);

        Ok(Self {
            game,
            repo,
            resolver,
        })
    }
}

pub fn spinner(cli: &Cli, message: impl Into<String>) -> Result<ProgressBar> {
    if cli.quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?,
    );
    pb.set_message(message.into());
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

/// `--yes` answers everything; otherwise ask on the terminal around `pb`.
pub fn confirmer(cli: &Cli, pb: &ProgressBar) -> Box<dyn Confirm> {
    if cli.yes {
        Box::new(AssumeYes)
    } else {
        Box::new(TerminalConfirm::new().with_progress(pb.clone()))
    }
}
