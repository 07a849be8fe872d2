//! `project.*` (§6): projects and their controller connection profiles.

use std::path::Path;

use chrono::Utc;
use clap::Subcommand;
use shadowforge_core::model::{ConnectionProfile, Project};
use shadowforge_db::{ProjectRepo, SqliteProjectRepo};

use super::{open_db, parse_id, parse_vendor};

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project.
    Create { name: String },
    /// List all projects.
    List,
    /// Fetch one project by id.
    Get { id: String },
    /// Rename a project.
    Update { id: String, name: String },
    /// Delete a project.
    Delete { id: String },
    /// Attach or replace a project's controller connection profile.
    SetConnection {
        id: String,
        #[arg(long)]
        vendor: String,
        #[arg(long)]
        address: String,
        #[arg(long)]
        port: u16,
        #[arg(long)]
        slot: Option<u8>,
        #[arg(long)]
        rack: Option<u8>,
    },
}

pub async fn run(db_path: &Path, command: ProjectCommands) -> anyhow::Result<()> {
    let pool = open_db(db_path).await?;
    let repo = SqliteProjectRepo::new(pool);

    match command {
        ProjectCommands::Create { name } => {
            let now = Utc::now();
            let project = Project {
                id: shadowforge_core::ResourceId::new(),
                name,
                connection: None,
                created_at: now,
                updated_at: now,
            };
            repo.create_project(&project).await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        ProjectCommands::List => {
            let projects = repo.list_projects().await?;
            println!("{}", serde_json::to_string_pretty(&projects)?);
        }
        ProjectCommands::Get { id } => {
            let project = repo.get_project(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        ProjectCommands::Update { id, name } => {
            let mut project = repo.get_project(parse_id("id", &id)?).await?;
            project.name = name;
            project.updated_at = Utc::now();
            repo.update_project(&project).await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
        ProjectCommands::Delete { id } => {
            repo.delete_project(parse_id("id", &id)?).await?;
            println!("deleted");
        }
        ProjectCommands::SetConnection {
            id,
            vendor,
            address,
            port,
            slot,
            rack,
        } => {
            let mut project = repo.get_project(parse_id("id", &id)?).await?;
            project.connection = Some(ConnectionProfile {
                vendor: parse_vendor(&vendor)?,
                address,
                port,
                slot,
                rack,
            });
            project.updated_at = Utc::now();
            repo.update_project(&project).await?;
            println!("{}", serde_json::to_string_pretty(&project)?);
        }
    }
    Ok(())
}
