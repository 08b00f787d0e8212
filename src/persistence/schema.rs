//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS` and are
//! re-run on every node startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// One row per project: the mutable fields live in a single JSON
/// document, with `is_live` mirrored into its own column for queries.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS project_record (
    project_id      TEXT PRIMARY KEY NOT NULL,
    document        TEXT NOT NULL,
    is_live         INTEGER NOT NULL DEFAULT 0,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_project_live ON project_record(is_live);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
