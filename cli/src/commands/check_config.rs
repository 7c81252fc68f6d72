use super::load_config;
use anyhow::{Result, bail};
use archon_core::HostEnv;
use archon_core::config::Severity;
use clap::Args;

#[derive(Args)]
pub struct CheckConfigCommand {}

impl CheckConfigCommand {
    pub fn run(&self, cli: &crate::Cli) -> Result<()> {
        let (path, config) = load_config(cli)?;
        println!("Checking {}", path.display());

        let issues = config.check(&HostEnv::detect());

        for key in config.games.keys() {
            let scope = format!("game: {key}");
            let failed = issues.iter().any(|i| i.scope == scope && i.is_error());
            println!("{key} ... {}", if failed { "error!" } else { "OK." });
        }

        for issue in &issues {
            match issue.severity {
                Severity::Warning => eprintln!("⚠️  {issue}"),
                Severity::Error => eprintln!("❌ {issue}"),
            }
        }

        let errors = issues.iter().filter(|i| i.is_error()).count();
        if errors > 0 {
            bail!("{errors} problem(s) found in {}", path.display());
        }
        println!("✅ Config looks good");
        Ok(())
    }
}
