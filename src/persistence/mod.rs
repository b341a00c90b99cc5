//! Persistence layer: window offsets and completion flags.

pub mod db;
pub mod override_repo;
pub mod parameter_repo;
pub mod schema;

/// Re-export the database pool type for convenience.
pub use sqlx::SqlitePool;
