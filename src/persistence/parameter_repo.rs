//! Window offset repository for `SQLite` persistence.
//!
//! Values are stored as text so a corrupted row can be detected and
//! reported on load instead of failing the whole read.

use std::sync::Arc;

use chrono::Utc;

use crate::models::ParameterKey;
use crate::Result;

use super::db::Database;

/// Repository for the eight window offsets.
#[derive(Clone)]
pub struct ParameterRepo {
    db: Arc<Database>,
}

#[derive(sqlx::FromRow)]
struct ParameterRow {
    name: String,
    value: String,
}

impl ParameterRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the value stored for `key`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the upsert fails.
    pub async fn save(&self, key: ParameterKey, value: f64) -> Result<()> {
        sqlx::query(
            "INSERT INTO task_parameter (name, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key.to_string())
        .bind(value.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.as_ref())
        .await?;
        Ok(())
    }

    /// All stored `(name, raw value)` rows, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn load_all(&self) -> Result<Vec<(String, String)>> {
        let rows: Vec<ParameterRow> =
            sqlx::query_as("SELECT name, value FROM task_parameter ORDER BY name ASC")
                .fetch_all(self.db.as_ref())
                .await?;
        Ok(rows.into_iter().map(|row| (row.name, row.value)).collect())
    }
}
