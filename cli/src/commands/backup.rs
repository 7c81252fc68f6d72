use super::{GameContext, confirmer, spinner};
use anyhow::{Context, Result};
use archon_core::snapshot::create_snapshot;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct BackupCommand {
    #[arg(help = "Game key from the config")]
    game: String,
}

impl BackupCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = GameContext::load(cli, &self.game)?;
        info!("Backing up '{}' into {}", ctx.game.name, ctx.repo.path().display());

        let pb = spinner(cli, format!("Backing up {}...", ctx.game.name))?;
        let mut confirm = confirmer(cli, &pb);
        let outcome = create_snapshot(&ctx.repo, &ctx.game, &ctx.resolver, confirm.as_mut());
        pb.finish_and_clear();
        let outcome = outcome.with_context(|| format!("Backup of '{}' failed", self.game))?;

        let size = std::fs::metadata(&outcome.archive).map(|m| m.len()).unwrap_or(0);
        println!("✅ Backup completed successfully!");
        println!("📦 Archive: {}", outcome.archive.display());
        println!(
            "📁 Items: {} ({} archive entries)",
            outcome.manifest.files.len(),
            outcome.archive_entries
        );
        println!("💾 Size: {:.2} MB", size as f64 / 1024.0 / 1024.0);
        if cli.verbose {
            for entry in &outcome.manifest.files {
                let modified = entry.modified_at.format("%Y-%m-%d %H:%M:%S UTC");
                println!("   {} ({})", entry.archive_path, modified);
            }
        }
        Ok(())
    }
}
