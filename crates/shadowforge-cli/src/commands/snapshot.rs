//! `snapshot.*` (§6): named pointers at a version.

use std::path::Path;

use clap::Subcommand;
use shadowforge_db::{SqliteVersionRepo, VersionRepo};
use shadowforge_versioning::create_snapshot;

use super::{open_db, parse_id};

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Create a named snapshot at a version.
    Create {
        project_id: String,
        version_id: String,
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        created_by: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Fetch one snapshot by id.
    Get { id: String },
    /// List a project's snapshots.
    List { project_id: String },
}

pub async fn run(db_path: &Path, command: SnapshotCommands) -> anyhow::Result<()> {
    let pool = open_db(db_path).await?;
    let repo = SqliteVersionRepo::new(pool);

    match command {
        SnapshotCommands::Create {
            project_id,
            version_id,
            name,
            description,
            created_by,
            tags,
        } => {
            let project_id = parse_id("project_id", &project_id)?;
            let existing = repo.list_snapshots(project_id).await?;
            let existing_names: Vec<String> = existing.into_iter().map(|s| s.name).collect();
            let snapshot = create_snapshot(
                project_id,
                parse_id("version_id", &version_id)?,
                name,
                description,
                tags,
                created_by,
                &existing_names,
            )?;
            repo.create_snapshot(&snapshot).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        SnapshotCommands::Get { id } => {
            let snapshot = repo.get_snapshot(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&snapshot)?);
        }
        SnapshotCommands::List { project_id } => {
            let snapshots = repo.list_snapshots(parse_id("project_id", &project_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        }
    }
    Ok(())
}
