//! `deploy.*` (§6): the deployment state machine's command surface.

use std::path::Path;

use clap::Subcommand;
use shadowforge_core::model::{ApprovalStatus, DeployStrategy, Stage};
use shadowforge_db::{DeployRepo, SqliteDeployRepo, SqliteVersionRepo, VersionRepo};
use shadowforge_deploy::{
    cancel_deployment, checks::CheckInput, create_deployment, execute_rollback, pause_deployment,
    record_check_outcome, run_safety_checks, start_deployment, submit_approval, AlwaysHealthy,
    DeployEvent,
};
use shadowforge_sync::{publish_deploy_step, Broadcaster};
use tokio::sync::mpsc;

use super::{open_db, parse_id};

fn parse_strategy(raw: &str) -> anyhow::Result<DeployStrategy> {
    match raw.to_ascii_lowercase().as_str() {
        "atomic" => Ok(DeployStrategy::Atomic),
        "canary" => Ok(DeployStrategy::Canary),
        "staged" => Ok(DeployStrategy::Staged),
        other => Err(anyhow::anyhow!("unknown deploy strategy {other:?}")),
    }
}

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

fn parse_approval_status(raw: &str) -> anyhow::Result<ApprovalStatus> {
    match raw.to_ascii_lowercase().as_str() {
        "approved" => Ok(ApprovalStatus::Approved),
        "rejected" => Ok(ApprovalStatus::Rejected),
        "pending" => Ok(ApprovalStatus::Pending),
        other => Err(anyhow::anyhow!("unknown approval status {other:?}")),
    }
}

#[derive(Subcommand)]
pub enum DeployCommands {
    /// Seed a deployment and its required approvals.
    Create {
        project_id: String,
        release_id: String,
        version_id: String,
        deploy_name: String,
        #[arg(long)]
        environment: String,
        #[arg(long, default_value = "atomic")]
        strategy: String,
        #[arg(long)]
        initiated_by: String,
        #[arg(long = "runtime")]
        target_runtimes: Vec<String>,
        #[arg(long, default_value_t = 0)]
        estimated_downtime_seconds: u64,
    },
    /// Fetch one deployment by id.
    Get { id: String },
    /// List a project's deployments.
    List { project_id: String },
    /// Run the pre-deploy safety-check suite against logic files on disk.
    ChecksRerun {
        id: String,
        #[arg(long = "logic-file")]
        logic_files: Vec<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
        #[arg(long = "io-address")]
        io_addresses: Vec<String>,
        #[arg(long, default_value_t = 0)]
        estimated_downtime_seconds: u64,
    },
    /// Record one approval's disposition.
    ApprovalsSubmit {
        deploy_id: String,
        approval_id: String,
        approver_name: String,
        status: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Drive the deployment's rollout script to completion.
    Start { id: String },
    /// Pause a running deployment.
    Pause { id: String },
    /// Cancel a deployment without attempting a rollback.
    Cancel { id: String, reason: String },
    /// Roll back to the deployment's previous version.
    Rollback {
        id: String,
        triggered_by: String,
        reason: String,
        #[arg(long)]
        automatic: bool,
    },
    /// Query a deployment's rollout log.
    LogsQuery { id: String },
}

pub async fn run(db_path: &Path, command: DeployCommands) -> anyhow::Result<()> {
    let pool = open_db(db_path).await?;
    let repo = SqliteDeployRepo::new(pool);

    match command {
        DeployCommands::Create {
            project_id,
            release_id,
            version_id,
            deploy_name,
            environment,
            strategy,
            initiated_by,
            target_runtimes,
            estimated_downtime_seconds,
        } => {
            let project_id = parse_id("project_id", &project_id)?;
            let release_id = parse_id("release_id", &release_id)?;
            let environment = parse_stage(&environment)?;

            // §4.9 steps 1-2: stage progression and `previousVersionId` are
            // derived from persisted history here, not trusted from the
            // caller, so a deploy can't target a stage that was never
            // actually promoted into.
            let version_repo = SqliteVersionRepo::new(open_db(db_path).await?);
            let release = version_repo.get_release(release_id).await?;
            let promotion_history = version_repo.list_promotions(release.snapshot_id).await?;
            let deployment_history = repo.list_deploys(project_id).await?;

            let (deploy, approvals) = create_deployment(
                project_id,
                release_id,
                parse_id("version_id", &version_id)?,
                Some(release.snapshot_id),
                deploy_name,
                environment,
                parse_strategy(&strategy)?,
                initiated_by,
                target_runtimes,
                estimated_downtime_seconds,
                &promotion_history,
                &deployment_history,
            )?;
            repo.create_deploy(&deploy, &approvals).await?;
            println!("{}", serde_json::to_string_pretty(&deploy)?);
        }
        DeployCommands::Get { id } => {
            let deploy = repo.get_deploy(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&deploy)?);
        }
        DeployCommands::List { project_id } => {
            let deploys = repo.list_deploys(parse_id("project_id", &project_id)?).await?;
            println!("{}", serde_json::to_string_pretty(&deploys)?);
        }
        DeployCommands::ChecksRerun {
            id,
            logic_files,
            tags,
            io_addresses,
            estimated_downtime_seconds,
        } => {
            let deploy_id = parse_id("id", &id)?;
            let mut deploy = repo.get_deploy(deploy_id).await?;
            let mut loaded = Vec::with_capacity(logic_files.len());
            for path in &logic_files {
                loaded.push((path.clone(), std::fs::read_to_string(path)?));
            }
            let input = CheckInput {
                logic_files: &loaded,
                tag_names: &tags,
                io_addresses: &io_addresses,
                estimated_downtime_seconds,
            };
            let checks = run_safety_checks(deploy_id, &input);
            repo.record_checks(&checks).await?;
            record_check_outcome(&mut deploy, &checks);
            repo.update_deploy(&deploy).await?;
            println!("{}", serde_json::to_string_pretty(&checks)?);
        }
        DeployCommands::ApprovalsSubmit {
            deploy_id,
            approval_id,
            approver_name,
            status,
            comment,
        } => {
            let deploy_id = parse_id("deploy_id", &deploy_id)?;
            let mut deploy = repo.get_deploy(deploy_id).await?;
            let mut approvals = repo.list_approvals(deploy_id).await?;
            submit_approval(
                &mut deploy,
                &mut approvals,
                parse_id("approval_id", &approval_id)?,
                approver_name,
                parse_approval_status(&status)?,
                comment,
            )?;
            repo.update_deploy(&deploy).await?;
            for approval in &approvals {
                repo.update_approval(approval).await?;
            }
            println!("{}", serde_json::to_string_pretty(&deploy)?);
        }
        DeployCommands::Start { id } => {
            let deploy_id = parse_id("id", &id)?;
            let mut deploy = repo.get_deploy(deploy_id).await?;
            let (tx, mut rx) = mpsc::channel(32);
            let (logs, rollback) = start_deployment(&mut deploy, &AlwaysHealthy, tx).await?;
            for entry in &logs {
                repo.append_log(entry).await?;
            }
            if let Some(rollback) = rollback {
                repo.create_rollback(&rollback).await?;
            }
            repo.update_deploy(&deploy).await?;

            // No subscriber ever attaches to a one-shot CLI invocation's
            // broadcaster, same limitation as `sync.streamTags`; this still
            // exercises the real StepStarted/StepCompleted -> scenarioStep
            // translation path a long-running server process would use.
            let broadcaster = Broadcaster::new();
            while let Ok(event) = rx.try_recv() {
                match &event {
                    DeployEvent::StepStarted { step, progress }
                    | DeployEvent::StepCompleted { step, progress } => {
                        publish_deploy_step(&broadcaster, step, *progress);
                    }
                    _ => {}
                }
                println!("{event:?}");
            }
            println!("{}", serde_json::to_string_pretty(&deploy)?);
        }
        DeployCommands::Pause { id } => {
            let deploy_id = parse_id("id", &id)?;
            let mut deploy = repo.get_deploy(deploy_id).await?;
            let entry = pause_deployment(&mut deploy);
            repo.append_log(&entry).await?;
            repo.update_deploy(&deploy).await?;
            println!("{}", serde_json::to_string_pretty(&deploy)?);
        }
        DeployCommands::Cancel { id, reason } => {
            let deploy_id = parse_id("id", &id)?;
            let mut deploy = repo.get_deploy(deploy_id).await?;
            let entry = cancel_deployment(&mut deploy, reason);
            repo.append_log(&entry).await?;
            repo.update_deploy(&deploy).await?;
            println!("{}", serde_json::to_string_pretty(&deploy)?);
        }
        DeployCommands::Rollback {
            id,
            triggered_by,
            reason,
            automatic,
        } => {
            let deploy_id = parse_id("id", &id)?;
            let mut deploy = repo.get_deploy(deploy_id).await?;
            let (rollback, entry) = execute_rollback(&mut deploy, triggered_by, reason, automatic)?;
            repo.append_log(&entry).await?;
            repo.create_rollback(&rollback).await?;
            repo.update_deploy(&deploy).await?;
            println!("{}", serde_json::to_string_pretty(&rollback)?);
        }
        DeployCommands::LogsQuery { id } => {
            let logs = repo.list_logs(parse_id("id", &id)?).await?;
            println!("{}", serde_json::to_string_pretty(&logs)?);
        }
    }
    Ok(())
}
