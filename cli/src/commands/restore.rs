use super::{GameContext, confirmer, spinner};
use anyhow::{Context, Result};
use archon_core::snapshot::restore_snapshot;
use clap::Args;
use std::path::PathBuf;
use tracing::info;

#[derive(Args)]
pub struct RestoreCommand {
    #[arg(help = "Game key from the config")]
    game: String,

    #[arg(help = "Snapshot archive (.zip) to restore from")]
    archive: PathBuf,
}

impl RestoreCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = GameContext::load(cli, &self.game)?;
        info!("Restoring '{}' from {}", ctx.game.name, self.archive.display());

        let pb = spinner(cli, format!("Restoring {}...", ctx.game.name))?;
        let mut confirm = confirmer(cli, &pb);
        let report = restore_snapshot(
            &ctx.repo,
            &self.archive,
            &ctx.game,
            &ctx.resolver,
            confirm.as_mut(),
        );
        pb.finish_and_clear();
        let report = report.with_context(|| format!("Restore of '{}' failed", self.game))?;

        println!("✅ Restore completed!");
        println!("📁 Restored: {} items ({} files)", report.restored.len(), report.files);
        if report.origin_mismatch {
            println!("🖥️  Snapshot came from another OS");
        }
        if !report.overwritten.is_empty() {
            println!("♻️  Overwritten: {}", report.overwritten.len());
        }
        if !report.undeclared.is_empty() {
            println!("⚠️  Not in current config: {}", report.undeclared.len());
        }
        if cli.verbose {
            for path in &report.restored {
                println!("   {}", path.display());
            }
        }
        Ok(())
    }
}
