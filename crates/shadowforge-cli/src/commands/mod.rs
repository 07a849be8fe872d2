//! CLI command implementations, one module per resource family (§6).

pub mod deploy;
pub mod logic;
pub mod project;
pub mod release;
pub mod snapshot;
pub mod sync;
pub mod tag;
pub mod version;

use std::path::Path;

use sqlx::SqlitePool;

/// Open (creating if absent) and migrate the persisted-state database at
/// `db_path`. Every command opens its own short-lived pool rather than
/// holding one across the process's lifetime, since the CLI is a
/// one-shot invocation, not a server.
pub async fn open_db(db_path: &Path) -> anyhow::Result<SqlitePool> {
    let pool = shadowforge_db::create_pool(db_path).await?;
    shadowforge_db::run_migrations(&pool).await?;
    Ok(pool)
}

/// Parse a `ResourceId` from a CLI argument, with a message naming the
/// field that failed to parse.
pub fn parse_id(field: &str, raw: &str) -> anyhow::Result<shadowforge_core::ResourceId> {
    raw.parse()
        .map_err(|_| anyhow::anyhow!("{field} is not a valid id: {raw:?}"))
}

/// Parse a vendor name, case-insensitively.
pub fn parse_vendor(raw: &str) -> anyhow::Result<shadowforge_core::model::Vendor> {
    use shadowforge_core::model::Vendor;
    match raw.to_ascii_lowercase().as_str() {
        "neutral" => Ok(Vendor::Neutral),
        "siemens" => Ok(Vendor::Siemens),
        "rockwell" => Ok(Vendor::Rockwell),
        "beckhoff" => Ok(Vendor::Beckhoff),
        other => Err(anyhow::anyhow!(
            "unknown vendor {other:?}, expected one of neutral/siemens/rockwell/beckhoff"
        )),
    }
}
