//! Version-chain repository: versions, version files, snapshots,
//! snapshot promotions, and releases (spec §3, §4.7, §4.8, §6).

use async_trait::async_trait;
use shadowforge_core::model::{Release, Snapshot, SnapshotPromotion, Version, VersionFile};
use shadowforge_core::ResourceId;
use sqlx::SqlitePool;

use crate::{DbError, DbResult};

#[async_trait]
pub trait VersionRepo: Send + Sync {
    async fn create_version(&self, version: &Version, files: &[VersionFile]) -> DbResult<()>;
    async fn get_version(&self, id: ResourceId) -> DbResult<Version>;
    async fn list_versions(&self, project_id: ResourceId) -> DbResult<Vec<Version>>;
    async fn update_version(&self, version: &Version) -> DbResult<()>;
    async fn list_version_files(&self, version_id: ResourceId) -> DbResult<Vec<VersionFile>>;

    async fn create_snapshot(&self, snapshot: &Snapshot) -> DbResult<()>;
    async fn get_snapshot(&self, id: ResourceId) -> DbResult<Snapshot>;
    async fn get_snapshot_by_name(&self, project_id: ResourceId, name: &str) -> DbResult<Snapshot>;
    async fn list_snapshots(&self, project_id: ResourceId) -> DbResult<Vec<Snapshot>>;

    async fn record_promotion(&self, promotion: &SnapshotPromotion) -> DbResult<()>;
    async fn list_promotions(&self, snapshot_id: ResourceId) -> DbResult<Vec<SnapshotPromotion>>;

    async fn create_release(&self, release: &Release) -> DbResult<()>;
    async fn get_release(&self, id: ResourceId) -> DbResult<Release>;
    async fn list_releases(&self, project_id: ResourceId) -> DbResult<Vec<Release>>;
    async fn update_release(&self, release: &Release) -> DbResult<()>;
}

pub struct SqliteVersionRepo {
    pool: SqlitePool,
}

impl SqliteVersionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to<T: serde::de::DeserializeOwned>(json: String) -> DbResult<T> {
    Ok(serde_json::from_str(&json)?)
}

#[async_trait]
impl VersionRepo for SqliteVersionRepo {
    async fn create_version(&self, version: &Version, files: &[VersionFile]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;
        let data = serde_json::to_string(version)?;
        sqlx::query(
            "INSERT INTO versions (id, project_id, branch_id, label, timestamp, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(version.id.to_string())
        .bind(version.project_id.to_string())
        .bind(version.branch_id.to_string())
        .bind(&version.label)
        .bind(version.timestamp.to_rfc3339())
        .bind(data)
        .execute(&mut *tx)
        .await?;

        for file in files {
            let file_data = serde_json::to_string(file)?;
            sqlx::query("INSERT INTO version_files (version_id, path, data) VALUES (?1, ?2, ?3)")
                .bind(version.id.to_string())
                .bind(&file.path)
                .bind(file_data)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_version(&self, id: ResourceId) -> DbResult<Version> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM versions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("version {id}")))?;
        row_to(data)
    }

    async fn list_versions(&self, project_id: ResourceId) -> DbResult<Vec<Version>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM versions WHERE project_id = ?1 ORDER BY timestamp",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_version(&self, version: &Version) -> DbResult<()> {
        let data = serde_json::to_string(version)?;
        let result = sqlx::query("UPDATE versions SET data = ?1 WHERE id = ?2")
            .bind(data)
            .bind(version.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("version {}", version.id)));
        }
        Ok(())
    }

    async fn list_version_files(&self, version_id: ResourceId) -> DbResult<Vec<VersionFile>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM version_files WHERE version_id = ?1 ORDER BY path",
        )
        .bind(version_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn create_snapshot(&self, snapshot: &Snapshot) -> DbResult<()> {
        let data = serde_json::to_string(snapshot)?;
        let result = sqlx::query(
            "INSERT INTO snapshots (id, project_id, version_id, name, created_at, data)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(snapshot.id.to_string())
        .bind(snapshot.project_id.to_string())
        .bind(snapshot.version_id.to_string())
        .bind(&snapshot.name)
        .bind(snapshot.created_at.to_rfc3339())
        .bind(data)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(e)) if e.is_unique_violation() => Err(DbError::Duplicate(
                format!("snapshot named {} already exists", snapshot.name),
            )),
            Err(e) => Err(DbError::Database(e)),
        }
    }

    async fn get_snapshot(&self, id: ResourceId) -> DbResult<Snapshot> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM snapshots WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("snapshot {id}")))?;
        row_to(data)
    }

    async fn get_snapshot_by_name(&self, project_id: ResourceId, name: &str) -> DbResult<Snapshot> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT data FROM snapshots WHERE project_id = ?1 AND name = ?2",
        )
        .bind(project_id.to_string())
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("snapshot named {name}")))?;
        row_to(data)
    }

    async fn list_snapshots(&self, project_id: ResourceId) -> DbResult<Vec<Snapshot>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM snapshots WHERE project_id = ?1 ORDER BY created_at",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn record_promotion(&self, promotion: &SnapshotPromotion) -> DbResult<()> {
        let data = serde_json::to_string(promotion)?;
        sqlx::query(
            "INSERT INTO snapshot_promotions (snapshot_id, to_stage, promoted_at, data)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(promotion.snapshot_id.to_string())
        .bind(format!("{:?}", promotion.to_stage))
        .bind(promotion.promoted_at.to_rfc3339())
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_promotions(&self, snapshot_id: ResourceId) -> DbResult<Vec<SnapshotPromotion>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM snapshot_promotions WHERE snapshot_id = ?1 ORDER BY promoted_at",
        )
        .bind(snapshot_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn create_release(&self, release: &Release) -> DbResult<()> {
        let data = serde_json::to_string(release)?;
        sqlx::query(
            "INSERT INTO releases (id, project_id, snapshot_id, environment, data)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(release.id.to_string())
        .bind(release.project_id.to_string())
        .bind(release.snapshot_id.to_string())
        .bind(format!("{:?}", release.environment))
        .bind(data)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_release(&self, id: ResourceId) -> DbResult<Release> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM releases WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("release {id}")))?;
        row_to(data)
    }

    async fn list_releases(&self, project_id: ResourceId) -> DbResult<Vec<Release>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM releases WHERE project_id = ?1")
                .bind(project_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_release(&self, release: &Release) -> DbResult<()> {
        let data = serde_json::to_string(release)?;
        let result = sqlx::query("UPDATE releases SET data = ?1 WHERE id = ?2")
            .bind(data)
            .bind(release.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("release {}", release.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowforge_core::model::{Stage, VersionStatus};

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_version(project_id: ResourceId, branch_id: ResourceId) -> Version {
        Version {
            id: ResourceId::new(),
            project_id,
            branch_id,
            label: "v1".to_string(),
            author: "jdoe".to_string(),
            timestamp: chrono::Utc::now(),
            message: "initial capture".to_string(),
            status: VersionStatus::Draft,
            checksum: "deadbeef".to_string(),
            parent_version_id: None,
            approvals: Vec::new(),
            approvals_required: 0,
            signed: false,
            signed_by: None,
            signed_at: None,
            signature: None,
            original_size: 100,
            compressed_size: 40,
            changelog: Vec::new(),
        }
    }

    #[tokio::test]
    async fn create_version_persists_its_files() {
        let repo = SqliteVersionRepo::new(pool().await);
        let project_id = ResourceId::new();
        let branch_id = ResourceId::new();
        let version = sample_version(project_id, branch_id);
        let files = vec![VersionFile {
            version_id: version.id,
            path: "Main.st".to_string(),
            file_type: shadowforge_core::model::FileKind::Logic,
            change_type: shadowforge_core::model::ChangeType::Added,
            lines_added: 3,
            lines_deleted: 0,
            size: 40,
            sha256: "abc".to_string(),
            storage_path: "versions/p/v1/Main.st".to_string(),
            is_compressed: false,
            is_delta: false,
            delta_base_file_id: None,
            diff_preview: None,
        }];
        repo.create_version(&version, &files).await.unwrap();

        let fetched = repo.get_version(version.id).await.unwrap();
        assert_eq!(fetched.label, "v1");
        let fetched_files = repo.list_version_files(version.id).await.unwrap();
        assert_eq!(fetched_files.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_snapshot_name_in_the_same_project_is_rejected() {
        let repo = SqliteVersionRepo::new(pool().await);
        let project_id = ResourceId::new();
        let snapshot = Snapshot {
            id: ResourceId::new(),
            project_id,
            version_id: ResourceId::new(),
            name: "release-candidate".to_string(),
            description: None,
            tags: Vec::new(),
            created_by: "jdoe".to_string(),
            created_at: chrono::Utc::now(),
        };
        repo.create_snapshot(&snapshot).await.unwrap();

        let duplicate = Snapshot {
            id: ResourceId::new(),
            ..snapshot.clone()
        };
        let result = repo.create_snapshot(&duplicate).await;
        assert!(matches!(result, Err(DbError::Duplicate(_))));
    }

    #[tokio::test]
    async fn promotions_list_in_chronological_order() {
        let repo = SqliteVersionRepo::new(pool().await);
        let snapshot_id = ResourceId::new();
        let first = SnapshotPromotion {
            snapshot_id,
            from_stage: Stage::Dev,
            to_stage: Stage::Qa,
            promoted_by: "jdoe".to_string(),
            promoted_at: chrono::Utc::now(),
            notes: None,
            checks_passed: true,
        };
        repo.record_promotion(&first).await.unwrap();
        let listed = repo.list_promotions(snapshot_id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].to_stage, Stage::Qa);
    }
}
