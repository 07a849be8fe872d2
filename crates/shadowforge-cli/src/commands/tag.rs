//! `tag.*` (§6): tags and the UDTs they can reference.

use std::path::Path;

use clap::Subcommand;
use shadowforge_core::model::{AlarmThresholds, Tag, TagLifecycle, TagScope, TagSource, TagType, Udt};
use shadowforge_db::{ProjectRepo, SqliteProjectRepo};

use super::{open_db, parse_id};

fn parse_tag_type_str(raw: &str) -> Result<TagType, String> {
    match raw.to_ascii_lowercase().as_str() {
        "bool" => Ok(TagType::Bool),
        "int" => Ok(TagType::Int),
        "dint" => Ok(TagType::Dint),
        "real" => Ok(TagType::Real),
        "lreal" => Ok(TagType::Lreal),
        "string" => Ok(TagType::String),
        "time" => Ok(TagType::Time),
        "array" => Ok(TagType::Array),
        "udt" => Ok(TagType::Udt),
        other => Err(format!("unknown tag type {other:?}")),
    }
}

fn parse_tag_type(raw: &str) -> anyhow::Result<TagType> {
    parse_tag_type_str(raw).map_err(|e| anyhow::anyhow!(e))
}

fn parse_scope(raw: &str) -> anyhow::Result<TagScope> {
    match raw.to_ascii_lowercase().as_str() {
        "global" => Ok(TagScope::Global),
        "program" => Ok(TagScope::Program),
        "task" => Ok(TagScope::Task),
        other => Err(anyhow::anyhow!("unknown tag scope {other:?}")),
    }
}

#[derive(Subcommand)]
pub enum TagCommands {
    /// Create a tag.
    Create {
        project_id: String,
        name: String,
        #[arg(long)]
        tag_type: String,
        #[arg(long, default_value = "global")]
        scope: String,
        #[arg(long)]
        udt_type: Option<String>,
        #[arg(long, default_value = "")]
        hierarchy_path: String,
    },
    /// Fetch one tag by id.
    Get { id: String },
    /// List a project's tags.
    List { project_id: String },
    /// Rename a tag.
    Update { id: String, name: String },
    /// Delete a tag.
    Delete { id: String },
    /// Create a UDT (user-defined composite type). Members are supplied
    /// as `name:type` pairs.
    CreateUdt {
        project_id: String,
        name: String,
        #[arg(long = "member", value_parser = parse_member)]
        members: Vec<(String, TagType)>,
    },
    /// Fetch one UDT by id.
    GetUdt { id: String },
    /// List a project's UDTs.
    ListUdts { project_id: String },
}

fn parse_member(raw: &str) -> Result<(String, TagType), String> {
    let (name, member_type) = raw
        .split_once(':')
        .ok_or_else(|| format!("member {raw:?} must be NAME:TYPE"))?;
    Ok((name.to_string(), parse_tag_type_str(member_type)?))
}

pub async fn run(db_path: &Path, command: TagCommands) -> anyhow::Result<()> {
    let pool = open_db(db_path).await?;
    let repo = SqliteProjectRepo::new(pool);

    match command {
        TagCommands::Create {
            project_id,
            name,
            tag_type,
            scope,
            udt_type,
            hierarchy_path,
        } => {
            let tag = Tag {
                id: shadowforge_core::ResourceId::new(),
                project_id: parse_id("project_id", &project_id)?,
                name,
                tag_type: parse_tag_type(&tag_type)?,
                udt_type,
                value: serde_json::Value::Null,
                vendor_address: None,
                source: TagSource::Shadow,
                scope: parse_scope(&scope)?,
                lifecycle: TagLifecycle::Draft,
                hierarchy_path,
                alarms: AlarmThresholds::default(),
                read_only: false,
                requires_approval: false,
            };
            repo.create_tag(&tag).await?;
            println!("{}", serde_json::to_string_pretty(&tag)?);
        }
        TagCommands::Get { id } => {
            let tag = repo.get_tag(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&tag)?);
        }
        TagCommands::List { project_id } => {
            let tags = repo.list_tags(parse_id("project_id", &project_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&tags)?);
        }
        TagCommands::Update { id, name } => {
            let mut tag = repo.get_tag(parse_id("id", &id)?).await?;
            tag.name = name;
            repo.update_tag(&tag).await?;
            println!("{}", serde_json::to_string_pretty(&tag)?);
        }
        TagCommands::Delete { id } => {
            repo.delete_tag(parse_id("id", &id)?).await?;
            println!("deleted");
        }
        TagCommands::CreateUdt {
            project_id,
            name,
            members,
        } => {
            let udt = Udt {
                id: shadowforge_core::ResourceId::new(),
                project_id: parse_id("project_id", &project_id)?,
                name,
                members: members
                    .into_iter()
                    .map(|(name, member_type)| shadowforge_core::model::UdtMember {
                        name,
                        member_type,
                        udt_type: None,
                        array_size: None,
                        default: None,
                        description: None,
                    })
                    .collect(),
            };
            repo.create_udt(&udt).await?;
            println!("{}", serde_json::to_string_pretty(&udt)?);
        }
        TagCommands::GetUdt { id } => {
            let udt = repo.get_udt(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&udt)?);
        }
        TagCommands::ListUdts { project_id } => {
            let udts = repo.list_udts(parse_id("project_id", &project_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&udts)?);
        }
    }
    Ok(())
}
