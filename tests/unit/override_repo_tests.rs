//! Unit tests for the completion flag repository.

use std::sync::Arc;

use kerbside::models::{BinColor, TaskKey, TaskType};
use kerbside::persistence::db;
use kerbside::persistence::override_repo::OverrideRepo;

#[tokio::test]
async fn empty_store_loads_nothing() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let repo = OverrideRepo::new(database);
    assert!(repo.load_all().await.expect("load").is_empty());
}

#[tokio::test]
async fn saved_flags_round_trip() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    let repo = OverrideRepo::new(Arc::clone(&database));
    let red = TaskKey::new(BinColor::Red, TaskType::PutOut);
    let yellow = TaskKey::new(BinColor::Yellow, TaskType::BringIn);

    repo.save(red, true).await.expect("save");
    repo.save(yellow, false).await.expect("save");
    repo.save(red, false).await.expect("overwrite");
    repo.save(red, true).await.expect("overwrite");

    let mut loaded = repo.load_all().await.expect("load");
    loaded.sort_by_key(|(key, _)| key.index());
    assert_eq!(loaded, vec![(red, true), (yellow, false)]);
}

#[tokio::test]
async fn unknown_task_rows_are_skipped() {
    let database = Arc::new(db::connect_memory().await.expect("db"));
    sqlx::query("INSERT INTO task_override (task, completed, updated_at) VALUES (?1, ?2, ?3)")
        .bind("green_put_out")
        .bind(1_i64)
        .bind("2025-10-01T00:00:00Z")
        .execute(database.as_ref())
        .await
        .expect("insert");

    let repo = OverrideRepo::new(database);
    assert!(repo.load_all().await.expect("load").is_empty());
}

#[tokio::test]
async fn file_database_persists_across_connections() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("nested").join("kerbside.db");
    let key = TaskKey::new(BinColor::Yellow, TaskType::PutOut);

    {
        let database = Arc::new(db::connect(&path).await.expect("db"));
        OverrideRepo::new(Arc::clone(&database))
            .save(key, true)
            .await
            .expect("save");
        database.close().await;
    }

    let database = Arc::new(db::connect(&path).await.expect("reopen"));
    let loaded = OverrideRepo::new(database).load_all().await.expect("load");
    assert_eq!(loaded, vec![(key, true)]);
}
