use super::OutputFormat;
use anyhow::{Context, Result};
use archon_core::archive::read_manifest;
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct ShowCommand {
    #[arg(help = "Snapshot archive (.zip)")]
    archive: PathBuf,

    #[arg(long, value_enum, default_value_t, help = "Output format")]
    format: OutputFormat,
}

impl ShowCommand {
    pub fn run(&self, _cli: &crate::Cli) -> Result<()> {
        let manifest = read_manifest(&self.archive)
            .with_context(|| format!("Failed to read {}", self.archive.display()))?;

        match self.format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&manifest)?);
            }
            OutputFormat::Table => {
                println!("📸 Snapshot: {}", manifest.name);
                println!("📅 Created: {}", manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
                println!("🖥️  OS: {}", manifest.os);
                println!(
                    "🔧 Tool version: {} (manifest v{})",
                    manifest.tool_version, manifest.version
                );
                println!();
                println!("{:<22} {:<20} {}", "Type", "Modified", "Path");
                println!("{:-<80}", "");
                for entry in &manifest.files {
                    println!(
                        "{:<22} {:<20} {}",
                        entry.category,
                        entry.modified_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.original_path
                    );
                }
                let counts = manifest
                    .category_counts()
                    .into_iter()
                    .map(|(category, n)| format!("{category}: {n}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!();
                println!("📁 {} items ({})", manifest.files.len(), counts);
            }
        }
        Ok(())
    }
}
