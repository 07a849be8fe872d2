//! Project repository: projects, logic files, tags, UDTs, and branches
//! (spec §3, §6).

use async_trait::async_trait;
use shadowforge_core::model::{Branch, LogicFile, Project, Tag, Udt};
use shadowforge_core::ResourceId;
use sqlx::SqlitePool;

use crate::{DbError, DbResult};

#[async_trait]
pub trait ProjectRepo: Send + Sync {
    async fn create_project(&self, project: &Project) -> DbResult<()>;
    async fn get_project(&self, id: ResourceId) -> DbResult<Project>;
    async fn list_projects(&self) -> DbResult<Vec<Project>>;
    async fn update_project(&self, project: &Project) -> DbResult<()>;
    async fn delete_project(&self, id: ResourceId) -> DbResult<()>;

    async fn create_logic_file(&self, file: &LogicFile) -> DbResult<()>;
    async fn get_logic_file(&self, id: ResourceId) -> DbResult<LogicFile>;
    async fn list_logic_files(&self, project_id: ResourceId) -> DbResult<Vec<LogicFile>>;
    async fn update_logic_file(&self, file: &LogicFile) -> DbResult<()>;

    async fn create_tag(&self, tag: &Tag) -> DbResult<()>;
    async fn get_tag(&self, id: ResourceId) -> DbResult<Tag>;
    async fn list_tags(&self, project_id: ResourceId) -> DbResult<Vec<Tag>>;
    async fn update_tag(&self, tag: &Tag) -> DbResult<()>;
    async fn delete_tag(&self, id: ResourceId) -> DbResult<()>;

    async fn create_udt(&self, udt: &Udt) -> DbResult<()>;
    async fn get_udt(&self, id: ResourceId) -> DbResult<Udt>;
    async fn list_udts(&self, project_id: ResourceId) -> DbResult<Vec<Udt>>;

    async fn create_branch(&self, branch: &Branch) -> DbResult<()>;
    async fn get_branch(&self, id: ResourceId) -> DbResult<Branch>;
    async fn list_branches(&self, project_id: ResourceId) -> DbResult<Vec<Branch>>;
    async fn update_branch(&self, branch: &Branch) -> DbResult<()>;
}

pub struct SqliteProjectRepo {
    pool: SqlitePool,
}

impl SqliteProjectRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to<T: serde::de::DeserializeOwned>(json: String) -> DbResult<T> {
    Ok(serde_json::from_str(&json)?)
}

#[async_trait]
impl ProjectRepo for SqliteProjectRepo {
    async fn create_project(&self, project: &Project) -> DbResult<()> {
        let data = serde_json::to_string(project)?;
        sqlx::query("INSERT INTO projects (id, name, data) VALUES (?1, ?2, ?3)")
            .bind(project.id.to_string())
            .bind(&project.name)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_project(&self, id: ResourceId) -> DbResult<Project> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM projects WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("project {id}")))?;
        row_to(data)
    }

    async fn list_projects(&self) -> DbResult<Vec<Project>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT data FROM projects ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_project(&self, project: &Project) -> DbResult<()> {
        let data = serde_json::to_string(project)?;
        let result = sqlx::query("UPDATE projects SET name = ?1, data = ?2 WHERE id = ?3")
            .bind(&project.name)
            .bind(data)
            .bind(project.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("project {}", project.id)));
        }
        Ok(())
    }

    async fn delete_project(&self, id: ResourceId) -> DbResult<()> {
        sqlx::query("DELETE FROM projects WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_logic_file(&self, file: &LogicFile) -> DbResult<()> {
        let data = serde_json::to_string(file)?;
        sqlx::query("INSERT INTO logic_files (id, project_id, path, data) VALUES (?1, ?2, ?3, ?4)")
            .bind(file.id.to_string())
            .bind(file.project_id.to_string())
            .bind(&file.path)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_logic_file(&self, id: ResourceId) -> DbResult<LogicFile> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM logic_files WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("logic file {id}")))?;
        row_to(data)
    }

    async fn list_logic_files(&self, project_id: ResourceId) -> DbResult<Vec<LogicFile>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT data FROM logic_files WHERE project_id = ?1 ORDER BY path",
        )
        .bind(project_id.to_string())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_logic_file(&self, file: &LogicFile) -> DbResult<()> {
        let data = serde_json::to_string(file)?;
        let result = sqlx::query("UPDATE logic_files SET path = ?1, data = ?2 WHERE id = ?3")
            .bind(&file.path)
            .bind(data)
            .bind(file.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("logic file {}", file.id)));
        }
        Ok(())
    }

    async fn create_tag(&self, tag: &Tag) -> DbResult<()> {
        let data = serde_json::to_string(tag)?;
        sqlx::query("INSERT INTO tags (id, project_id, name, data) VALUES (?1, ?2, ?3, ?4)")
            .bind(tag.id.to_string())
            .bind(tag.project_id.to_string())
            .bind(&tag.name)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_tag(&self, id: ResourceId) -> DbResult<Tag> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM tags WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("tag {id}")))?;
        row_to(data)
    }

    async fn list_tags(&self, project_id: ResourceId) -> DbResult<Vec<Tag>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM tags WHERE project_id = ?1 ORDER BY name")
                .bind(project_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_tag(&self, tag: &Tag) -> DbResult<()> {
        let data = serde_json::to_string(tag)?;
        let result = sqlx::query("UPDATE tags SET name = ?1, data = ?2 WHERE id = ?3")
            .bind(&tag.name)
            .bind(data)
            .bind(tag.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("tag {}", tag.id)));
        }
        Ok(())
    }

    async fn delete_tag(&self, id: ResourceId) -> DbResult<()> {
        sqlx::query("DELETE FROM tags WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_udt(&self, udt: &Udt) -> DbResult<()> {
        let data = serde_json::to_string(udt)?;
        sqlx::query("INSERT INTO udts (id, project_id, name, data) VALUES (?1, ?2, ?3, ?4)")
            .bind(udt.id.to_string())
            .bind(udt.project_id.to_string())
            .bind(&udt.name)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_udt(&self, id: ResourceId) -> DbResult<Udt> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM udts WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("udt {id}")))?;
        row_to(data)
    }

    async fn list_udts(&self, project_id: ResourceId) -> DbResult<Vec<Udt>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM udts WHERE project_id = ?1 ORDER BY name")
                .bind(project_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn create_branch(&self, branch: &Branch) -> DbResult<()> {
        let data = serde_json::to_string(branch)?;
        sqlx::query("INSERT INTO branches (id, project_id, name, data) VALUES (?1, ?2, ?3, ?4)")
            .bind(branch.id.to_string())
            .bind(branch.project_id.to_string())
            .bind(&branch.name)
            .bind(data)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_branch(&self, id: ResourceId) -> DbResult<Branch> {
        let row: Option<(String,)> = sqlx::query_as("SELECT data FROM branches WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        let (data,) = row.ok_or_else(|| DbError::NotFound(format!("branch {id}")))?;
        row_to(data)
    }

    async fn list_branches(&self, project_id: ResourceId) -> DbResult<Vec<Branch>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT data FROM branches WHERE project_id = ?1 ORDER BY name")
                .bind(project_id.to_string())
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(|(d,)| row_to(d)).collect()
    }

    async fn update_branch(&self, branch: &Branch) -> DbResult<()> {
        let data = serde_json::to_string(branch)?;
        let result = sqlx::query("UPDATE branches SET name = ?1, data = ?2 WHERE id = ?3")
            .bind(&branch.name)
            .bind(data)
            .bind(branch.id.to_string())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("branch {}", branch.id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shadowforge_core::model::Vendor;

    async fn pool() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        sqlx::migrate!("./migrations").run(&pool).await.unwrap();
        pool
    }

    fn sample_project() -> Project {
        Project {
            id: ResourceId::new(),
            name: "Line 4 Bottler".to_string(),
            connection: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let repo = SqliteProjectRepo::new(pool().await);
        let project = sample_project();
        repo.create_project(&project).await.unwrap();
        let fetched = repo.get_project(project.id).await.unwrap();
        assert_eq!(fetched.name, project.name);
    }

    #[tokio::test]
    async fn get_missing_project_is_not_found() {
        let repo = SqliteProjectRepo::new(pool().await);
        let result = repo.get_project(ResourceId::new()).await;
        assert!(matches!(result, Err(DbError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_logic_files_scopes_to_project() {
        let repo = SqliteProjectRepo::new(pool().await);
        let project = sample_project();
        repo.create_project(&project).await.unwrap();
        let other_project = sample_project();
        repo.create_project(&other_project).await.unwrap();

        let file = LogicFile {
            id: ResourceId::new(),
            project_id: project.id,
            path: "Main.st".to_string(),
            vendor: Vendor::Neutral,
            content: "PROGRAM Main\nEND_PROGRAM".to_string(),
            author: "jdoe".to_string(),
            last_modified: chrono::Utc::now(),
        };
        repo.create_logic_file(&file).await.unwrap();

        let other_file = LogicFile {
            id: ResourceId::new(),
            project_id: other_project.id,
            ..file.clone()
        };
        repo.create_logic_file(&other_file).await.unwrap();

        let listed = repo.list_logic_files(project.id).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, file.id);
    }

    #[tokio::test]
    async fn update_project_persists_the_new_name() {
        let repo = SqliteProjectRepo::new(pool().await);
        let mut project = sample_project();
        repo.create_project(&project).await.unwrap();
        project.name = "Line 4 Bottler (renamed)".to_string();
        repo.update_project(&project).await.unwrap();
        let fetched = repo.get_project(project.id).await.unwrap();
        assert_eq!(fetched.name, "Line 4 Bottler (renamed)");
    }
}
