//! `SQLite` schema bootstrap logic.
//!
//! Both tables use `CREATE TABLE IF NOT EXISTS`, so this runs on every
//! startup.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS task_parameter (
    name            TEXT PRIMARY KEY NOT NULL,
    value           TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS task_override (
    task            TEXT PRIMARY KEY NOT NULL,
    completed       INTEGER NOT NULL DEFAULT 0,
    updated_at      TEXT NOT NULL
);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
