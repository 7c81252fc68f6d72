use super::{GameContext, confirmer, spinner};
use anyhow::{Context, Result};
use archon_core::health::DEFAULT_MAX_AGE;
use archon_core::snapshot::clean_game;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct CleanCommand {
    #[arg(help = "Game key from the config")]
    game: String,
}

impl CleanCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = GameContext::load(cli, &self.game)?;
        info!("Cleaning {}", ctx.game.install_dir.display());

        let pb = spinner(cli, format!("Cleaning {}...", ctx.game.name))?;
        let mut confirm = confirmer(cli, &pb);
        let outcome = clean_game(
            &ctx.repo,
            &ctx.game,
            &ctx.resolver,
            DEFAULT_MAX_AGE,
            confirm.as_mut(),
        );
        pb.finish_and_clear();
        let outcome = outcome.with_context(|| format!("Clean of '{}' failed", self.game))?;

        println!("✅ Clean completed!");
        println!(
            "🗑️  Removed: {} entries from {}",
            outcome.removed,
            ctx.game.install_dir.display()
        );
        println!("📸 {}", outcome.condition.describe(DEFAULT_MAX_AGE));
        Ok(())
    }
}
