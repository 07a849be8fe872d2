//! `version.*` (§6): capturing, transitioning, signing, approving, and
//! comparing versions.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use shadowforge_core::model::{FileKind, VersionStatus};
use shadowforge_db::{SqliteVersionRepo, VersionRepo};
use shadowforge_versioning::{create_version, NewVersionFile, NewVersionInput};

use super::{open_db, parse_id};

fn parse_status(raw: &str) -> anyhow::Result<VersionStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "draft" => Ok(VersionStatus::Draft),
        "staged" => Ok(VersionStatus::Staged),
        "released" => Ok(VersionStatus::Released),
        "deprecated" => Ok(VersionStatus::Deprecated),
        other => Err(anyhow::anyhow!("unknown version status {other:?}")),
    }
}

#[derive(Subcommand)]
pub enum VersionCommands {
    /// Capture a new version from one or more files on disk.
    Create {
        project_id: String,
        branch_id: String,
        #[arg(long)]
        author: String,
        #[arg(long)]
        message: String,
        /// One or more `path=local-file` pairs to capture.
        #[arg(long = "file", value_parser = parse_file_arg)]
        files: Vec<(String, PathBuf)>,
        /// Overrides the default of 3 approvals required before release.
        #[arg(long)]
        approvals_required: Option<u32>,
    },
    /// Fetch one version by id.
    Get { id: String },
    /// List a project's versions.
    List { project_id: String },
    /// Transition a version's status.
    UpdateStatus { id: String, status: String },
    /// Sign a version.
    Sign {
        id: String,
        #[arg(long)]
        signer: String,
        #[arg(long)]
        signature: String,
    },
    /// Record an approval.
    Approve { id: String, approver: String },
    /// Compare two versions' captured files by path and checksum.
    Compare { old_version_id: String, new_version_id: String },
    /// List a version's captured files.
    GetFiles { id: String },
}

fn parse_file_arg(raw: &str) -> Result<(String, PathBuf), String> {
    let (path, local) = raw
        .split_once('=')
        .ok_or_else(|| format!("{raw:?} must be PATH=LOCAL_FILE"))?;
    Ok((path.to_string(), PathBuf::from(local)))
}

pub async fn run(db_path: &Path, command: VersionCommands) -> anyhow::Result<()> {
    let pool = open_db(db_path).await?;
    let repo = SqliteVersionRepo::new(pool);

    match command {
        VersionCommands::Create {
            project_id,
            branch_id,
            author,
            message,
            files,
            approvals_required,
        } => {
            let project_id = parse_id("project_id", &project_id)?;
            let branch_id = parse_id("branch_id", &branch_id)?;

            let existing = repo.list_versions(project_id).await?;
            let parent = existing
                .into_iter()
                .filter(|v| v.branch_id == branch_id)
                .max_by_key(|v| v.timestamp);

            let mut input_files = Vec::with_capacity(files.len());
            for (path, local) in files {
                input_files.push(NewVersionFile {
                    path,
                    file_type: FileKind::Logic,
                    content: std::fs::read_to_string(&local)?,
                });
            }

            let input = NewVersionInput {
                project_id,
                branch_id,
                author,
                message,
                files: input_files,
                approvals_required,
            };
            // The content-addressed store backing each version's file
            // content lives outside this database (§6), so a CLI-captured
            // version can't load its predecessor's bytes to diff against
            // — every captured file shows as Added. Label increments
            // still track the branch's most recent version.
            let (version, version_files) = create_version(input, parent.as_ref(), &[]);
            repo.create_version(&version, &version_files).await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        VersionCommands::Get { id } => {
            let version = repo.get_version(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        VersionCommands::List { project_id } => {
            let versions = repo.list_versions(parse_id("project_id", &project_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&versions)?);
        }
        VersionCommands::UpdateStatus { id, status } => {
            let mut version = repo.get_version(parse_id("id", &id)?).await?;
            shadowforge_versioning::update_version_status(&mut version, parse_status(&status)?)?;
            repo.update_version(&version).await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        VersionCommands::Sign { id, signer, signature } => {
            let mut version = repo.get_version(parse_id("id", &id)?).await?;
            shadowforge_versioning::sign_version(&mut version, &signer, signature)?;
            repo.update_version(&version).await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        VersionCommands::Approve { id, approver } => {
            let mut version = repo.get_version(parse_id("id", &id)?).await?;
            shadowforge_versioning::approve_version(&mut version, &approver)?;
            repo.update_version(&version).await?;
            println!("{}", serde_json::to_string_pretty(&version)?);
        }
        VersionCommands::Compare {
            old_version_id,
            new_version_id,
        } => {
            let old_files = repo.list_version_files(parse_id("old_version_id", &old_version_id)?).await?;
            let new_files = repo.list_version_files(parse_id("new_version_id", &new_version_id)?).await?;
            println!("{}", render_compare(&old_files, &new_files));
        }
        VersionCommands::GetFiles { id } => {
            let files = repo.list_version_files(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&files)?);
        }
    }
    Ok(())
}

fn render_compare(
    old_files: &[shadowforge_core::model::VersionFile],
    new_files: &[shadowforge_core::model::VersionFile],
) -> String {
    let mut lines = Vec::new();
    for new_file in new_files {
        match old_files.iter().find(|f| f.path == new_file.path) {
            None => lines.push(format!("added:    {}", new_file.path)),
            Some(old_file) if old_file.sha256 != new_file.sha256 => {
                lines.push(format!("modified: {}", new_file.path))
            }
            Some(_) => {}
        }
    }
    for old_file in old_files {
        if !new_files.iter().any(|f| f.path == old_file.path) {
            lines.push(format!("deleted:  {}", old_file.path));
        }
    }
    if lines.is_empty() {
        "no differences".to_string()
    } else {
        lines.join("\n")
    }
}
