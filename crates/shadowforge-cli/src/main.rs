//! shadowforge CLI: the operator-facing surface over the persisted
//! project/version/release/deploy state (spec §6).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "shadowforge")]
#[command(about = "shadowforge release-management CLI", long_about = None)]
struct Cli {
    /// Path to the persisted-state SQLite database.
    #[arg(long, env = "DB_PATH", default_value = "./data/shadowforge.db")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects and their controller connection profiles.
    Project {
        #[command(subcommand)]
        command: commands::project::ProjectCommands,
    },
    /// Manage ST logic files: CRUD, syntax validation, formatting.
    Logic {
        #[command(subcommand)]
        command: commands::logic::LogicCommands,
    },
    /// Manage tags and UDTs.
    Tag {
        #[command(subcommand)]
        command: commands::tag::TagCommands,
    },
    /// Capture, inspect, and transition versions.
    Version {
        #[command(subcommand)]
        command: commands::version::VersionCommands,
    },
    /// Create and inspect named snapshots.
    Snapshot {
        #[command(subcommand)]
        command: commands::snapshot::SnapshotCommands,
    },
    /// Promote, sign, and inspect releases.
    Release {
        #[command(subcommand)]
        command: commands::release::ReleaseCommands,
    },
    /// Drive the deployment state machine.
    Deploy {
        #[command(subcommand)]
        command: commands::deploy::DeployCommands,
    },
    /// The live command surface (§4.10): shadow/live writes, fault
    /// injection, and logic pushes.
    Sync {
        #[command(subcommand)]
        command: commands::sync::SyncCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Project { command } => commands::project::run(&cli.db_path, command).await?,
        Commands::Logic { command } => commands::logic::run(&cli.db_path, command).await?,
        Commands::Tag { command } => commands::tag::run(&cli.db_path, command).await?,
        Commands::Version { command } => commands::version::run(&cli.db_path, command).await?,
        Commands::Snapshot { command } => commands::snapshot::run(&cli.db_path, command).await?,
        Commands::Release { command } => commands::release::run(&cli.db_path, command).await?,
        Commands::Deploy { command } => commands::deploy::run(&cli.db_path, command).await?,
        Commands::Sync { command } => commands::sync::run(command).await?,
    }

    Ok(())
}
