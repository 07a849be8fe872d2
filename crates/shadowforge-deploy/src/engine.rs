//! The deployment state machine: creation, approval gating, the rollout
//! script, cancellation/pause/resume, and rollback (§4.9).

use async_trait::async_trait;
use chrono::Utc;
use shadowforge_core::{
    model::{
        ApprovalStatus, DeployApproval, DeployLog, DeployRecord, DeployRollback, DeployStatus,
        LogLevel, RollbackStatus, SnapshotPromotion, Stage,
    },
    Error, ResourceId, Result,
};
use tokio::sync::mpsc;

use crate::checks::checks_passed;

/// A post-deploy health probe. Production code wires this to the sync
/// surface's live-tag read path; tests use a fixed-answer fake.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    async fn check(&self, deploy: &DeployRecord) -> bool;
}

/// Always-healthy fake for tests and environments with no live target.
pub struct AlwaysHealthy;

#[async_trait]
impl HealthChecker for AlwaysHealthy {
    async fn check(&self, _deploy: &DeployRecord) -> bool {
        true
    }
}

/// Events emitted while driving the rollout script, mirrored after the
/// orchestrator's stage-event channel shape.
#[derive(Debug, Clone)]
pub enum DeployEvent {
    StepStarted { step: &'static str, progress: u8 },
    StepCompleted { step: &'static str, progress: u8 },
    HealthCheckFailed,
    RollbackTriggered { reason: String },
    DeploymentCompleted { success: bool },
}

/// The fixed rollout script and its progress breadcrumbs (§4.9).
const ROLLOUT_STEPS: [(&str, u8); 7] = [
    ("validation", 10),
    ("backup", 25),
    ("upload", 40),
    ("compile", 60),
    ("apply", 75),
    ("verify", 90),
    ("complete", 100),
];

fn log(deploy_id: ResourceId, level: LogLevel, step: &str, message: String) -> DeployLog {
    DeployLog {
        deploy_id,
        timestamp: Utc::now(),
        level,
        message,
        step: step.to_string(),
    }
}

/// Seed a new deployment record and its pending approvals (§4.9 steps
/// 1-5).
///
/// Step 1: `environment` must have an actual `SnapshotPromotion` into it
/// somewhere in `promotion_history` before a deployment can target it —
/// `Dev` is the baseline stage and needs no prior promotion. Step 2:
/// `previousVersionId` is derived here, not trusted from the caller, as
/// the most recently completed successful deployment in
/// `deployment_history` for the same (project, environment) pair.
/// `checks_passed` is the outcome of the safety-check suite run
/// immediately afterward.
#[allow(clippy::too_many_arguments)]
pub fn create_deployment(
    project_id: ResourceId,
    release_id: ResourceId,
    version_id: ResourceId,
    snapshot_id: Option<ResourceId>,
    deploy_name: String,
    environment: Stage,
    strategy: shadowforge_core::model::DeployStrategy,
    initiated_by: String,
    target_runtimes: Vec<String>,
    estimated_downtime_seconds: u64,
    promotion_history: &[SnapshotPromotion],
    deployment_history: &[DeployRecord],
) -> Result<(DeployRecord, Vec<DeployApproval>)> {
    if environment != Stage::Dev && !promotion_history.iter().any(|p| p.to_stage == environment) {
        return Err(Error::PreconditionFailed(format!(
            "no recorded promotion into {environment:?}; cannot deploy there"
        )));
    }

    let previous_version_id = deployment_history
        .iter()
        .filter(|d| {
            d.project_id == project_id && d.environment == environment && d.status == DeployStatus::Success
        })
        .max_by_key(|d| d.completed_at)
        .map(|d| d.version_id);

    let approvals_required = DeployRecord::approvals_required_for(environment);
    let deploy_id = ResourceId::new();

    let approvals = DeployRecord::required_roles_for(environment)
        .into_iter()
        .map(|role| DeployApproval {
            id: ResourceId::new(),
            deploy_id,
            approver_name: None,
            approver_role: role,
            status: ApprovalStatus::Pending,
            comment: None,
            requested_at: Utc::now(),
            responded_at: None,
            is_required: true,
        })
        .collect();

    let record = DeployRecord {
        id: deploy_id,
        project_id,
        release_id,
        version_id,
        snapshot_id,
        deploy_name,
        environment,
        strategy,
        status: DeployStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        duration_seconds: None,
        estimated_downtime_seconds,
        initiated_by,
        approved_by: None,
        approval_count: 0,
        approvals_required,
        target_runtimes,
        progress_percent: 0,
        error_message: None,
        rollback_reason: None,
        previous_version_id,
        checks_passed: false,
    };

    Ok((record, approvals))
}

/// Write one approval's disposition and recompute `approvalCount`/
/// `approvedBy` for the deployment ("last writer wins" — §4.9).
pub fn submit_approval(
    deploy: &mut DeployRecord,
    approvals: &mut [DeployApproval],
    approval_id: ResourceId,
    approver_name: String,
    status: ApprovalStatus,
    comment: Option<String>,
) -> Result<()> {
    let approval = approvals
        .iter_mut()
        .find(|a| a.id == approval_id)
        .ok_or_else(|| Error::NotFoundError(format!("approval {approval_id} not found")))?;
    approval.status = status;
    approval.comment = comment;
    approval.responded_at = Some(Utc::now());
    approval.approver_name = Some(approver_name.clone());

    deploy.approval_count = approvals
        .iter()
        .filter(|a| a.deploy_id == deploy.id && a.status == ApprovalStatus::Approved)
        .count() as u32;
    if status == ApprovalStatus::Approved {
        deploy.approved_by = Some(approver_name);
    }
    Ok(())
}

/// Drive the ordered rollout script to completion, then run the
/// post-deploy health check and trigger an automatic rollback on
/// failure. Requires `deploy.can_start()`; returns the accumulated
/// `DeployLog` entries plus the `DeployRollback` record if an automatic
/// rollback fired (the caller still has to persist both). Progress and
/// step events are sent best-effort over `events` (a full channel never
/// blocks or fails the rollout).
pub async fn start_deployment(
    deploy: &mut DeployRecord,
    health_checker: &dyn HealthChecker,
    events: mpsc::Sender<DeployEvent>,
) -> Result<(Vec<DeployLog>, Option<DeployRollback>)> {
    if !deploy.can_start() {
        return Err(Error::PreconditionFailed(
            "safety checks must pass and required approvals must be collected".to_string(),
        ));
    }

    deploy.status = DeployStatus::Running;
    deploy.started_at = Some(Utc::now());
    deploy.progress_percent = 0;

    let mut logs = Vec::with_capacity(ROLLOUT_STEPS.len() + 1);

    for (step, progress) in ROLLOUT_STEPS {
        let _ = events.try_send(DeployEvent::StepStarted { step, progress });
        logs.push(log(deploy.id, LogLevel::Info, step, format!("step {step} started")));
        deploy.progress_percent = progress;
        logs.push(log(
            deploy.id,
            LogLevel::Success,
            step,
            format!("step {step} complete ({progress}%)"),
        ));
        let _ = events.try_send(DeployEvent::StepCompleted { step, progress });
    }

    deploy.status = DeployStatus::Success;
    deploy.completed_at = Some(Utc::now());
    deploy.duration_seconds = deploy
        .started_at
        .zip(deploy.completed_at)
        .map(|(s, c)| (c - s).num_seconds().max(0) as u64);

    let healthy = health_checker.check(deploy).await;
    let mut rollback = None;
    if !healthy {
        let reason = "Health checks failed".to_string();
        logs.push(log(
            deploy.id,
            LogLevel::Warning,
            "complete",
            "post-deploy health check failed, triggering automatic rollback".to_string(),
        ));
        let _ = events.try_send(DeployEvent::HealthCheckFailed);
        let _ = events.try_send(DeployEvent::RollbackTriggered { reason: reason.clone() });

        match execute_rollback(deploy, "system".to_string(), reason.clone(), true) {
            Ok((record, rollback_log)) => {
                logs.push(rollback_log);
                rollback = Some(record);
            }
            Err(_) => {
                deploy.status = DeployStatus::Failed;
                deploy.rollback_reason = Some(reason.clone());
                deploy.error_message =
                    Some(format!("{reason}; no previous version recorded to roll back to"));
                logs.push(log(
                    deploy.id,
                    LogLevel::Error,
                    "rollback",
                    "automatic rollback skipped: no previous version recorded".to_string(),
                ));
            }
        }
    }

    let _ = events.try_send(DeployEvent::DeploymentCompleted { success: healthy });
    Ok((logs, rollback))
}

/// Validate the safety-check outcome into `deploy.checks_passed` (§4.9:
/// "the deployment remains pending regardless of check outcome").
pub fn record_check_outcome(deploy: &mut DeployRecord, checks: &[shadowforge_core::model::DeployCheck]) {
    deploy.checks_passed = checks_passed(checks);
}

/// User-initiated cancel: marks the deployment failed without attempting
/// a rollback.
pub fn cancel_deployment(deploy: &mut DeployRecord, reason: String) -> DeployLog {
    deploy.status = DeployStatus::Failed;
    deploy.error_message = Some(reason.clone());
    deploy.completed_at = Some(Utc::now());
    log(deploy.id, LogLevel::Error, "cancel", reason)
}

/// Pause mid-rollout, preserving state for a later resume.
pub fn pause_deployment(deploy: &mut DeployRecord) -> DeployLog {
    deploy.status = DeployStatus::Paused;
    log(deploy.id, LogLevel::Info, "pause", "deployment paused".to_string())
}

/// Resume re-enters `running`; the caller re-invokes the step script from
/// the last step not yet logged.
pub fn resume_deployment(deploy: &mut DeployRecord) -> DeployLog {
    deploy.status = DeployStatus::Running;
    log(deploy.id, LogLevel::Info, "resume", "deployment resumed".to_string())
}

/// Roll back to `previousVersionId`, requiring one to exist.
pub fn execute_rollback(
    deploy: &mut DeployRecord,
    triggered_by: String,
    reason: String,
    is_automatic: bool,
) -> Result<(DeployRollback, DeployLog)> {
    let _ = deploy
        .previous_version_id
        .ok_or_else(|| Error::PreconditionFailed("no previous version to roll back to".to_string()))?;

    let rollback = DeployRollback {
        id: ResourceId::new(),
        deploy_id: deploy.id,
        triggered_by,
        reason: reason.clone(),
        triggered_at: Utc::now(),
        completed_at: Some(Utc::now()),
        status: RollbackStatus::Success,
        is_automatic,
    };
    deploy.status = DeployStatus::RolledBack;
    deploy.rollback_reason = Some(reason.clone());
    let log_entry = log(deploy.id, LogLevel::Warning, "rollback", reason);
    Ok((rollback, log_entry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowforge_core::model::{ApproverRole, DeployStrategy};

    fn promotion_into(environment: Stage) -> SnapshotPromotion {
        SnapshotPromotion {
            snapshot_id: ResourceId::new(),
            from_stage: Stage::Dev,
            to_stage: environment,
            promoted_by: "ci".into(),
            promoted_at: Utc::now(),
            notes: None,
            checks_passed: true,
        }
    }

    fn make_deploy(environment: Stage) -> (DeployRecord, Vec<DeployApproval>) {
        let history = [promotion_into(environment)];
        create_deployment(
            ResourceId::new(),
            ResourceId::new(),
            ResourceId::new(),
            None,
            "nightly rollout".into(),
            environment,
            DeployStrategy::Atomic,
            "alice".into(),
            vec!["plc-1".into()],
            5,
            &history,
            &[],
        )
        .unwrap()
    }

    #[test]
    fn create_deployment_rejects_an_environment_never_promoted_into() {
        let result = create_deployment(
            ResourceId::new(),
            ResourceId::new(),
            ResourceId::new(),
            None,
            "nightly rollout".into(),
            Stage::Prod,
            DeployStrategy::Atomic,
            "alice".into(),
            vec!["plc-1".into()],
            5,
            &[],
            &[],
        );
        assert!(result.is_err());
    }

    #[test]
    fn create_deployment_derives_previous_version_from_deploy_history() {
        let project_id = ResourceId::new();
        let mut prior = DeployRecord {
            id: ResourceId::new(),
            project_id,
            release_id: ResourceId::new(),
            version_id: ResourceId::new(),
            snapshot_id: None,
            deploy_name: "prior".into(),
            environment: Stage::Dev,
            strategy: DeployStrategy::Atomic,
            status: DeployStatus::Success,
            created_at: Utc::now(),
            started_at: Some(Utc::now()),
            completed_at: Some(Utc::now()),
            duration_seconds: Some(10),
            estimated_downtime_seconds: 0,
            initiated_by: "alice".into(),
            approved_by: None,
            approval_count: 0,
            approvals_required: 0,
            target_runtimes: vec!["plc-1".into()],
            progress_percent: 100,
            error_message: None,
            rollback_reason: None,
            previous_version_id: None,
            checks_passed: true,
        };
        let expected_version_id = prior.version_id;
        let (deploy, _) = create_deployment(
            project_id,
            ResourceId::new(),
            ResourceId::new(),
            None,
            "next".into(),
            Stage::Dev,
            DeployStrategy::Atomic,
            "alice".into(),
            vec!["plc-1".into()],
            0,
            &[],
            std::slice::from_ref(&prior),
        )
        .unwrap();
        assert_eq!(deploy.previous_version_id, Some(expected_version_id));

        prior.status = DeployStatus::Failed;
        let (deploy, _) = create_deployment(
            project_id,
            ResourceId::new(),
            ResourceId::new(),
            None,
            "next".into(),
            Stage::Dev,
            DeployStrategy::Atomic,
            "alice".into(),
            vec!["plc-1".into()],
            0,
            &[],
            std::slice::from_ref(&prior),
        )
        .unwrap();
        assert_eq!(deploy.previous_version_id, None);
    }

    #[test]
    fn staging_requires_one_operations_manager_approval() {
        let (deploy, approvals) = make_deploy(Stage::Staging);
        assert_eq!(deploy.approvals_required, 1);
        assert_eq!(approvals.len(), 1);
        assert_eq!(approvals[0].approver_role, ApproverRole::OperationsManager);
    }

    #[test]
    fn prod_requires_safety_engineer_and_lead_developer() {
        let (deploy, approvals) = make_deploy(Stage::Prod);
        assert_eq!(deploy.approvals_required, 2);
        assert_eq!(approvals.len(), 2);
    }

    #[test]
    fn submit_approval_recomputes_count_and_last_writer() {
        let (mut deploy, mut approvals) = make_deploy(Stage::Prod);
        let first_id = approvals[0].id;
        submit_approval(
            &mut deploy,
            &mut approvals,
            first_id,
            "sam".into(),
            ApprovalStatus::Approved,
            None,
        )
        .unwrap();
        assert_eq!(deploy.approval_count, 1);
        assert_eq!(deploy.approved_by.as_deref(), Some("sam"));
    }

    #[tokio::test]
    async fn start_deployment_rejects_when_gates_are_not_met() {
        let (mut deploy, _) = make_deploy(Stage::Prod);
        let (tx, _rx) = mpsc::channel(16);
        let result = start_deployment(&mut deploy, &AlwaysHealthy, tx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn start_deployment_runs_full_script_and_succeeds() {
        let (mut deploy, _) = make_deploy(Stage::Dev);
        deploy.checks_passed = true;
        let (tx, mut rx) = mpsc::channel(16);
        let (logs, rollback) = start_deployment(&mut deploy, &AlwaysHealthy, tx).await.unwrap();
        assert_eq!(deploy.status, DeployStatus::Success);
        assert_eq!(deploy.progress_percent, 100);
        assert_eq!(logs.len(), 14);
        assert!(rollback.is_none());
        let mut saw_complete = false;
        while let Ok(event) = rx.try_recv() {
            if let DeployEvent::DeploymentCompleted { success } = event {
                saw_complete = true;
                assert!(success);
            }
        }
        assert!(saw_complete);
    }

    struct AlwaysUnhealthy;
    #[async_trait]
    impl HealthChecker for AlwaysUnhealthy {
        async fn check(&self, _deploy: &DeployRecord) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn failed_health_check_sets_rollback_reason() {
        let (mut deploy, _) = make_deploy(Stage::Dev);
        deploy.checks_passed = true;
        let (tx, _rx) = mpsc::channel(16);
        start_deployment(&mut deploy, &AlwaysUnhealthy, tx).await.unwrap();
        assert_eq!(deploy.rollback_reason.as_deref(), Some("Health checks failed"));
    }

    #[tokio::test]
    async fn failed_health_check_triggers_automatic_rollback() {
        let (mut deploy, _) = make_deploy(Stage::Dev);
        deploy.checks_passed = true;
        deploy.previous_version_id = Some(ResourceId::new());
        let (tx, _rx) = mpsc::channel(16);
        let (_, rollback) = start_deployment(&mut deploy, &AlwaysUnhealthy, tx).await.unwrap();
        assert_eq!(deploy.status, DeployStatus::RolledBack);
        let rollback = rollback.expect("automatic rollback record");
        assert!(rollback.is_automatic);
        assert_eq!(rollback.status, RollbackStatus::Success);
    }

    #[tokio::test]
    async fn failed_health_check_with_no_previous_version_fails_instead_of_panicking() {
        let (mut deploy, _) = make_deploy(Stage::Dev);
        deploy.checks_passed = true;
        let (tx, _rx) = mpsc::channel(16);
        let (_, rollback) = start_deployment(&mut deploy, &AlwaysUnhealthy, tx).await.unwrap();
        assert_eq!(deploy.status, DeployStatus::Failed);
        assert!(rollback.is_none());
    }

    #[test]
    fn rollback_requires_a_previous_version() {
        let (mut deploy, _) = make_deploy(Stage::Dev);
        let result = execute_rollback(&mut deploy, "ops".into(), "manual".into(), false);
        assert!(result.is_err());
    }

    #[test]
    fn rollback_with_previous_version_succeeds() {
        let (mut deploy, _) = make_deploy(Stage::Dev);
        deploy.previous_version_id = Some(ResourceId::new());
        let (rollback, _log) =
            execute_rollback(&mut deploy, "ops".into(), "manual".into(), false).unwrap();
        assert_eq!(rollback.status, RollbackStatus::Success);
        assert_eq!(deploy.status, DeployStatus::RolledBack);
    }
}
