mod commands;
mod prompt;

use anyhow::{Context, Result};
use archon_core::ErrorKind;
use clap::{Parser, Subcommand};
use commands::{
    backup::BackupCommand, check_config::CheckConfigCommand, clean::CleanCommand,
    restore::RestoreCommand, show::ShowCommand, snapshots::SnapshotsCommand,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "archon",
    version,
    about = "Snapshot and restore game save data",
    long_about = "Archon backs up a game's save data and settings from wherever they live (install dir, \
                  home, Windows AppData/Documents, Wine and Proton prefixes) into a single zip archive, \
                  and restores them later, possibly on another machine"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true, env = "ARCHON_CONFIG", help = "Config file path")]
    config: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,

    #[arg(short, long, global = true, help = "Answer yes to every question")]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Take a snapshot of a game's save data")]
    Backup(BackupCommand),

    #[command(about = "Restore a game's save data from a snapshot archive")]
    Restore(RestoreCommand),

    #[command(about = "Delete the contents of a game's install directory")]
    Clean(CleanCommand),

    #[command(about = "List a game's snapshots")]
    Snapshots(SnapshotsCommand),

    #[command(about = "Show the manifest of a snapshot archive")]
    Show(ShowCommand),

    #[command(about = "Check the config file for problems")]
    CheckConfig(CheckConfigCommand),

    #[command(about = "Print the version")]
    Version,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = init_tracing(cli.verbose, cli.quiet).and_then(|()| run(&cli));
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

fn run(cli: &Cli) -> Result<()> {
    debug!("Starting archon {}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Backup(ref cmd) => cmd.run(cli),
        Commands::Restore(ref cmd) => cmd.run(cli),
        Commands::Clean(ref cmd) => cmd.run(cli),
        Commands::Snapshots(ref cmd) => cmd.run(cli),
        Commands::Show(ref cmd) => cmd.run(cli),
        Commands::CheckConfig(ref cmd) => cmd.run(cli),
        Commands::Version => {
            println!("archon {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Prints the error chain and picks the exit code from the first core
/// error in it.
fn report(err: &anyhow::Error) -> ExitCode {
    let kind = core_kind(err);
    match kind {
        Some(ErrorKind::Cancelled) => eprintln!("🚫 {err:#}"),
        _ => eprintln!("Error: {err:?}"),
    }
    if kind == Some(ErrorKind::Configuration) {
        eprintln!("Hint: run `archon check-config` to list config problems");
    }
    ExitCode::from(exit_code(kind))
}

fn core_kind(err: &anyhow::Error) -> Option<ErrorKind> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<archon_core::Error>())
        .map(archon_core::Error::kind)
}

fn exit_code(kind: Option<ErrorKind>) -> u8 {
    match kind {
        Some(ErrorKind::Cancelled) => 2,
        Some(ErrorKind::Configuration) => 3,
        _ => 1,
    }
}

fn init_tracing(verbose: bool, quiet: bool) -> Result<()> {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::new(format!("archon={level},archon_core={level}")))
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).context("Setting default subscriber failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_cancelled_through_context() {
        let cancelled = archon_core::Error::Cancelled("clean not confirmed".into());
        let err = Result::<()>::Err(cancelled.into())
            .context("Clean of 'foo' failed")
            .unwrap_err();
        assert_eq!(core_kind(&err), Some(ErrorKind::Cancelled));
        assert_eq!(exit_code(core_kind(&err)), 2);
    }

    #[test]
    fn test_exit_codes() {
        let config = anyhow::Error::new(archon_core::Error::GameNotFound { key: "bar".into() });
        assert_eq!(exit_code(core_kind(&config)), 3);

        let unsafe_archive = anyhow::Error::new(archon_core::Error::EmptyManifest);
        assert_eq!(exit_code(core_kind(&unsafe_archive)), 1);

        let plain = anyhow!("archon.backup_dir is not set");
        assert_eq!(core_kind(&plain), None);
        assert_eq!(exit_code(None), 1);
    }
}
