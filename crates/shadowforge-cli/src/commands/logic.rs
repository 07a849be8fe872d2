//! `logic.*` (§6): CRUD over ST source files, syntax validation, and
//! reindenting formatting.

use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::Subcommand;
use shadowforge_core::model::LogicFile;
use shadowforge_db::{ProjectRepo, SqliteProjectRepo};

use super::{open_db, parse_id, parse_vendor};

#[derive(Subcommand)]
pub enum LogicCommands {
    /// Add a logic file to a project.
    Create {
        project_id: String,
        path: String,
        #[arg(long)]
        vendor: String,
        #[arg(long)]
        author: String,
        /// Path to the ST source on disk.
        #[arg(long)]
        file: PathBuf,
    },
    /// Fetch one logic file by id.
    Get { id: String },
    /// List a project's logic files.
    List { project_id: String },
    /// Replace a logic file's content.
    Update {
        id: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Syntax-check ST source without persisting anything.
    Validate {
        file: PathBuf,
        #[arg(long, default_value = "neutral")]
        vendor: String,
    },
    /// Re-indent ST source and print it to stdout.
    Format {
        file: PathBuf,
        #[arg(long, default_value_t = 4)]
        indent_width: usize,
    },
}

pub async fn run(db_path: &Path, command: LogicCommands) -> anyhow::Result<()> {
    match command {
        LogicCommands::Validate { file, vendor } => {
            let content = std::fs::read_to_string(&file)?;
            let outcome = shadowforge_sync::validate(&content, parse_vendor(&vendor)?);
            println!("{}", render_validation(&outcome));
            if !outcome.is_valid {
                std::process::exit(1);
            }
            return Ok(());
        }
        LogicCommands::Format { file, indent_width } => {
            let content = std::fs::read_to_string(&file)?;
            let formatted = shadowforge_lang::format(
                &content,
                shadowforge_lang::FormatOptions { indent_width },
            );
            print!("{formatted}");
            return Ok(());
        }
        _ => {}
    }

    let pool = open_db(db_path).await?;
    let repo = SqliteProjectRepo::new(pool);

    match command {
        LogicCommands::Create {
            project_id,
            path,
            vendor,
            author,
            file,
        } => {
            let content = std::fs::read_to_string(&file)?;
            let logic_file = LogicFile {
                id: shadowforge_core::ResourceId::new(),
                project_id: parse_id("project_id", &project_id)?,
                path,
                vendor: parse_vendor(&vendor)?,
                content,
                author,
                last_modified: Utc::now(),
            };
            repo.create_logic_file(&logic_file).await?;
            println!("{}", serde_json::to_string_pretty(&logic_file)?);
        }
        LogicCommands::Get { id } => {
            let file = repo.get_logic_file(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&file)?);
        }
        LogicCommands::List { project_id } => {
            let files = repo.list_logic_files(parse_id("project_id", &project_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
        LogicCommands::Update { id, file } => {
            let mut logic_file = repo.get_logic_file(parse_id("id", &id)?).await?;
            logic_file.content = std::fs::read_to_string(&file)?;
            logic_file.last_modified = Utc::now();
            repo.update_logic_file(&logic_file).await?;
            println!("{}", serde_json::to_string_pretty(&logic_file)?);
        }
        LogicCommands::Validate { .. } | LogicCommands::Format { .. } => unreachable!(),
    }
    Ok(())
}

fn render_validation(outcome: &shadowforge_sync::ValidationOutcome) -> String {
    if outcome.is_valid {
        return "valid".to_string();
    }
    let mut lines = vec!["invalid:".to_string()];
    for issue in &outcome.issues {
        lines.push(format!(
            "  {}:{} {:?} {}",
            issue.line, issue.column, issue.severity, issue.message
        ));
    }
    lines.join("\n")
}
