use super::{OutputFormat, load_config};
use anyhow::{Context, Result, anyhow};
use archon_core::Repository;
use clap::Args;
use tracing::info;

#[derive(Args)]
pub struct SnapshotsCommand {
    #[arg(help = "Game key from the config")]
    game: String,

    #[arg(long, value_enum, default_value_t, help = "Output format")]
    format: OutputFormat,

    #[arg(long, help = "Show latest N snapshots")]
    latest: Option<usize>,
}

impl SnapshotsCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let (_, config) = load_config(cli)?;
        let archon = config.archon()?;
        let game = config.game(&self.game)?;
        let backup_dir = archon
            .backup_dir
            .as_ref()
            .ok_or_else(|| anyhow!("archon.backup_dir is not set"))?;

        let repo = Repository::new(backup_dir, &game.name);
        info!("Listing snapshots in {}", repo.path().display());
        let mut snapshots = repo
            .list()
            .with_context(|| format!("Failed to list {}", repo.path().display()))?;

        if let Some(latest) = self.latest {
            snapshots.truncate(latest);
        }

        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(&snapshots)?;
                println!("{}", json);
            }
            OutputFormat::Table => {
                if snapshots.is_empty() {
                    println!("No snapshots found");
                    return Ok(());
                }

                println!("{:<40} {:<20} {:>10}", "Archive", "Taken", "Size");
                println!("{:-<72}", "");
                for snapshot in snapshots {
                    println!(
                        "{:<40} {:<20} {:>10}",
                        snapshot.file_name,
                        snapshot.taken_at.format("%Y-%m-%d %H:%M:%S"),
                        human_size(snapshot.size)
                    );
                }
            }
        }

        Ok(())
    }
}

fn human_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
