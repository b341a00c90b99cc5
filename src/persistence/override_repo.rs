//! Completion flag repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::models::TaskKey;
use crate::Result;

use super::db::Database;

/// Repository for the per-task completion flags.
#[derive(Clone)]
pub struct OverrideRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct OverrideRow {
    task: String,
    completed: i64,
}

impl OverrideRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the flag stored for `task`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn save(&self, task: TaskKey, completed: bool) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_override (task, completed, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(task) DO UPDATE SET completed = excluded.completed, updated_at = excluded.updated_at",
        )
        .bind(task.to_string())
        .bind(i64::from(completed))
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// All stored flags. Rows naming an unknown task are skipped.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_all(&self) -> Result<Vec<(TaskKey, bool)>> {
        let rows: Vec<OverrideRow> =
            sqlx::query_as("SELECT task, completed FROM task_override ORDER BY task ASC")
                .fetch_all(self.db.as_ref())
                .await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| match row.task.parse::<TaskKey>() {
                Ok(key) => Some((key, row.completed != 0)),
                Err(_) => {
                    warn!(task = %row.task, "ignoring unknown persisted task");
                    None
                }
            })
            .collect())
    }
}
