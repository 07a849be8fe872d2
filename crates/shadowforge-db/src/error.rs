//! Database error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("corrupt row: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type DbResult<T> = std::result::Result<T, DbError>;

impl From<DbError> for shadowforge_core::Error {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(msg) => shadowforge_core::Error::NotFoundError(msg),
            DbError::Duplicate(msg) => shadowforge_core::Error::ConflictError(msg),
            other => shadowforge_core::Error::IOError(other.to_string()),
        }
    }
}
