//! The persistence layer: repository traits and a SQLite implementation
//! of each, storing the metadata rows described in spec §6 ("a single
//! relational store... large file content lives outside the DB").

pub mod error;
pub mod repo;

pub use error::{DbError, DbResult};
pub use repo::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;

/// Open (creating if absent) the SQLite database at `db_path` (the
/// `DB_PATH` environment key, spec §6) and return a connection pool.
pub async fn create_pool(db_path: &Path) -> DbResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))
        .map_err(DbError::Database)?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Run pending migrations against a freshly opened pool.
pub async fn run_migrations(pool: &SqlitePool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
