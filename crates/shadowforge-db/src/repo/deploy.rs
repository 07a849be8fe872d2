//! Deployment repository: deploy records, approvals, safety checks,
//! rollout logs, and rollbacks (spec §3, §4.9, §6).

use async_trait::async_trait;
use shadowforge_core::model::{DeployApproval, DeployCheck, DeployLog, DeployRecord, DeployRollback};
use shadowforge_core::ResourceId;
use sqlx::SqlitePool;

use crate::{DbError, DbResult};

#[async_trait]
pub trait DeployRepo: Send + Sync {
    async fn create_deploy(&self, deploy: &DeployRecord, approvals: &[DeployApproval]) -> DbResult<()>;
    async fn get_deploy(&self, id: ResourceId) -> DbResult<DeployRecord>;
    async fn list_deploys(&self, project_id: ResourceId) -> DbResult<Vec<DeployRecord>>;
    async fn update_deploy(&self, deploy: &DeployRecord) -> DbResult<()>;

    async fn list_approvals(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployApproval>>;
    async fn update_approval(&self, approval: &DeployApproval) -> DbResult<()>;

    async fn record_checks(&self, checks: &[DeployCheck]) -> DbResult<()>;
    async fn list_checks(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployCheck>>;

    async fn append_log(&self, entry: &DeployLog) -> DbResult<()>;
    async fn list_logs(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployLog>>;

    async fn create_rollback(&self, rollback: &DeployRollback) -> DbResult<()>;
    async fn list_rollbacks(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployRollback>>;
}

pub struct SqliteDeployRepo {
    pool: SqlitePool,
}

impl SqliteDeployRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to<T: serde::de::DeserializeOwned>(json: String) -> DbResult<T> {
    Ok(serde_json::from_str(&json)?)
}

#[async_trait]
impl DeployRepo for SqliteDeployRepo {
    async fn create_deploy(&self, deploy: &DeployRecord, approvals: &[DeployApproval]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let data = serde_json::to_string(deploy)?;
        sqlx::query(
            "INSERT INTO deploy_records (id, project_id, release_id, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(deploy.id.to_string())
        .bind(deploy.project_id.to_string())
        .bind(deploy.release_id.to_string())
        .bind(deploy.created_at.to_rfc3339())
        .bind(data)
        .execute(&mut *tx)
        .await?;

        for approval in approvals {
            let approval_data = serde_json::to_string(approval)?;
            sqlx::query("INSERT INTO deploy_approvals (id, deploy_id, data) VALUES (?1, ?2, ?3)")
                .bind(approval.id.to_string())
                .bind(approval.deploy_id.to_string())
                .bind(approval_data)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_deploy(&self, id: ResourceId) -> DbResult<DeployRecord> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT data FROM deploy_records WHERE id = ?1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("deploy {id}")))?;
        row_to(data)
    }

    async fn list_deploys(&self, project_id: ResourceId) -> DbResult<Vec<DeployRecord>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM deploy_records WHERE project_id = ?1 ORDER BY created_at DESC",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_deploy(&self, deploy: &DeployRecord) -> DbResult<()> {
        let data = serde_json::to_string(deploy)?;
        let result = sqlx::query("UPDATE deploy_records SET data = ?1 WHERE id = ?2")
            .bind(data)
            .bind(deploy.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("deploy {}", deploy.id)));
        }
        Ok(())
    }

    async fn list_approvals(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployApproval>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM deploy_approvals WHERE deploy_id = ?1")
                .bind(deploy_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_approval(&self, approval: &DeployApproval) -> DbResult<()> {
        let data = serde_json::to_string(approval)?;
        let result = sqlx::query("UPDATE deploy_approvals SET data = ?1 WHERE id = ?2")
            .bind(data)
            .bind(approval.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("deploy approval {}", approval.id)));
        }
        Ok(())
    }

    async fn record_checks(&self, checks: &[DeployCheck]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        for check in checks {
            let data = serde_json::to_string(check)?;
            sqlx::query("INSERT INTO deploy_checks (id, deploy_id, data) VALUES (?1, ?2, ?3)")
                .bind(check.id.to_string())
                .bind(check.deploy_id.to_string())
                .bind(data)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_checks(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployCheck>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM deploy_checks WHERE deploy_id = ?1")
                .bind(deploy_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn append_log(&self, entry: &DeployLog) -> DbResult<()> {
        let data = serde_json::to_string(entry)?;
        let next_seq: (i64,) = sqlx::query_as(
            "SELECT COALESCE(MAX(seq), -1) + 1 FROM deploy_logs WHERE deploy_id = ?1",
        )
        .bind(entry.deploy_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        sqlx::query(
            "INSERT INTO deploy_logs (deploy_id, timestamp, seq, data) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(entry.deploy_id.to_string())
        .bind(entry.timestamp.to_rfc3339())
        .bind(next_seq.0)
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_logs(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployLog>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM deploy_logs WHERE deploy_id = ?1 ORDER BY seq",
        )
        .bind(deploy_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn create_rollback(&self, rollback: &DeployRollback) -> DbResult<()> {
        let data = serde_json::to_string(rollback)?;
        sqlx::query("INSERT INTO deploy_rollbacks (id, deploy_id, data) VALUES (?1, ?2, ?3)")
            .bind(rollback.id.to_string())
            .bind(rollback.deploy_id.to_string())
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_rollbacks(&self, deploy_id: ResourceId) -> DbResult<Vec<DeployRollback>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM deploy_rollbacks WHERE deploy_id = ?1")
                .bind(deploy_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowforge_core::model::{
        ApprovalStatus, ApproverRole, DeployStatus, DeployStrategy, LogLevel, Stage,
    };

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_deploy(project_id: ResourceId) -> DeployRecord {
        DeployRecord {
            id: ResourceId::new(),
            project_id,
            release_id: ResourceId::new(),
            version_id: ResourceId::new(),
            snapshot_id: None,
            deploy_name: "2026.07.28-release".to_string(),
            environment: Stage::Staging,
            strategy: DeployStrategy::Atomic,
            status: DeployStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            estimated_downtime_seconds: 0,
            initiated_by: "jdoe".to_string(),
            approved_by: None,
            approval_count: 0,
            approvals_required: 1,
            target_runtimes: vec!["line4-plc".to_string()],
            progress_percent: 0,
            error_message: None,
            rollback_reason: None,
            previous_version_id: None,
            checks_passed: false,
        }
    }

    #[tokio::test]
    async fn create_deploy_persists_its_seeded_approvals() {
        let repo = SqliteDeployRepo::new(pool().await);
        let project_id = ResourceId::new();
        let deploy = sample_deploy(project_id);
        let approval = DeployApproval {
            id: ResourceId::new(),
            deploy_id: deploy.id,
            approver_name: None,
            approver_role: ApproverRole::OperationsManager,
            status: ApprovalStatus::Pending,
            comment: None,
            requested_at: chrono::Utc::now(),
            responded_at: None,
            is_required: true,
        };
        repo.create_deploy(&deploy, &[approval.clone()]).await.unwrap();

        let fetched = repo.get_deploy(deploy.id).await.unwrap();
        assert_eq!(fetched.deploy_name, deploy.deploy_name);
        let approvals = repo.list_approvals(deploy.id).await.unwrap();
        assert_eq!(approvals.len(), 1);
    }

    #[tokio::test]
    async fn logs_append_in_order_and_list_back_in_the_same_order() {
        let repo = SqliteDeployRepo::new(pool().await);
        let deploy = sample_deploy(ResourceId::new());
        repo.create_deploy(&deploy, &[]).await.unwrap();

        for step in ["validation", "backup", "upload"] {
            repo.append_log(&DeployLog {
                deploy_id: deploy.id,
                timestamp: chrono::Utc::now(),
                level: LogLevel::Info,
                message: format!("{step} started"),
                step: step.to_string(),
            })
            .await
            .unwrap();
        }

        let logs = repo.list_logs(deploy.id).await.unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0].step, "validation");
        assert_eq!(logs[2].step, "upload");
    }
}
