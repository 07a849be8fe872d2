//! `release.*` (§6): minting, promoting, signing, and inspecting
//! releases.

use std::path::Path;

use clap::Subcommand;
use shadowforge_core::{model::Stage, Error};
use shadowforge_db::{SqliteVersionRepo, VersionRepo};
use shadowforge_versioning::promote_snapshot;

use super::{open_db, parse_id};

fn parse_stage(raw: &str) -> anyhow::Result<Stage> {
    match raw.to_ascii_lowercase().as_str() {
        "main" => Ok(Stage::Main),
        "dev" => Ok(Stage::Dev),
        "qa" => Ok(Stage::Qa),
        "staging" => Ok(Stage::Staging),
        "prod" => Ok(Stage::Prod),
        other => Err(anyhow::anyhow!("unknown stage {other:?}")),
    }
}

#[derive(Subcommand)]
pub enum ReleaseCommands {
    /// Promote a snapshot into `staging`/`prod`, minting the release
    /// that move produces.
    Create {
        snapshot_id: String,
        #[arg(long)]
        to_stage: String,
        #[arg(long)]
        promoted_by: String,
        #[arg(long)]
        checks_passed: bool,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        bundle_path: String,
        #[arg(long)]
        bundle_size: u64,
        #[arg(long)]
        bundle_checksum: String,
        #[arg(long)]
        release_name: String,
        #[arg(long)]
        release_version: String,
    },
    /// Fetch one release by id.
    Get { id: String },
    /// List a project's releases.
    List { project_id: String },
    /// Move a release's environment forward along the stage order.
    Promote { id: String, to_stage: String },
    /// Sign a release.
    Sign {
        id: String,
        #[arg(long)]
        signer: String,
        #[arg(long)]
        signature: String,
    },
}

pub async fn run(db_path: &Path, command: ReleaseCommands) -> anyhow::Result<()> {
    let pool = open_db(db_path).await?;
    let repo = SqliteVersionRepo::new(pool);

    match command {
        ReleaseCommands::Create {
            snapshot_id,
            to_stage,
            promoted_by,
            checks_passed,
            notes,
            bundle_path,
            bundle_size,
            bundle_checksum,
            release_name,
            release_version,
        } => {
            let snapshot_id = parse_id("snapshot_id", &snapshot_id)?;
            let snapshot = repo.get_snapshot(snapshot_id).await?;
            let mut version = repo.get_version(snapshot.version_id).await?;
            // §6: `fromStage` is derived from the snapshot's own promotion
            // history, never trusted from the caller, so an operator can't
            // skip a stage by asserting a `from_stage` that never happened.
            let from_stage = repo
                .list_promotions(snapshot_id)
                .await?
                .into_iter()
                .max_by_key(|p| p.promoted_at)
                .map(|p| p.to_stage)
                .unwrap_or(Stage::Dev);
            let (promotion, release) = promote_snapshot(
                &snapshot,
                &mut version,
                from_stage,
                parse_stage(&to_stage)?,
                promoted_by,
                checks_passed,
                notes,
                bundle_path,
                bundle_size,
                bundle_checksum,
                release_name,
                release_version,
            )?;
            repo.record_promotion(&promotion).await?;
            repo.update_version(&version).await?;
            match release {
                Some(release) => {
                    repo.create_release(&release).await?;
                    println!("{}", serde_json::to_string_pretty(&release)?);
                }
                None => println!(
                    "promotion recorded; {to_stage:?} does not mint a release (only staging/prod do)"
                ),
            }
        }
        ReleaseCommands::Get { id } => {
            let release = repo.get_release(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&release)?);
        }
        ReleaseCommands::List { project_id } => {
            let releases = repo.list_releases(parse_id("project_id", &project_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&releases)?);
        }
        ReleaseCommands::Promote { id, to_stage } => {
            let mut release = repo.get_release(parse_id("id", &id)?).await?;
            shadowforge_versioning::promote_release(&mut release, parse_stage(&to_stage)?)?;
            repo.update_release(&release).await?;
            println!("{}", serde_json::to_string_pretty(&release)?);
        }
        ReleaseCommands::Sign { id, signer, signature } => {
            let mut release = repo.get_release(parse_id("id", &id)?).await?;
            if release.signed {
                if release.signed_by != signer {
                    return Err(Error::ConflictError(format!(
                        "release already signed by {}",
                        release.signed_by
                    ))
                    .into());
                }
            } else {
                release.signed = true;
                release.signed_by = signer;
                release.signature = signature;
            }
            repo.update_release(&release).await?;
            println!("{}", serde_json::to_string_pretty(&release)?);
        }
    }
    Ok(())
}
