//! Integration tests for the SQLite-backed job store.

use autophoned::mailer::mock::MockMailer;
use autophoned::store::{JobStore, SqliteJobStore};
use std::sync::Arc;

async fn open_store() -> (SqliteJobStore, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("jobs.sqlite3");
    let mailer = Arc::new(MockMailer::new());
    let store = SqliteJobStore::open(path.to_str().unwrap(), mailer)
        .await
        .unwrap();
    (store, dir)
}

#[tokio::test]
async fn enqueue_then_take_next_round_trips() {
    let (store, _dir) = open_store().await;

    let id = store.enqueue("http://example.test/build.apk", "D1").await.unwrap();
    assert!(id > 0);

    let job = store.take_next("D1").await.unwrap();
    assert_eq!(job.id, id);
    assert_eq!(job.build_url, "http://example.test/build.apk");
    assert_eq!(job.device_id, "D1");
    assert_eq!(job.attempts, 1);
    assert!(job.last_attempt_at.is_some());
}

#[tokio::test]
async fn take_next_prefers_newest() {
    let (store, _dir) = open_store().await;

    store.enqueue("http://example.test/older.apk", "D1").await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    store.enqueue("http://example.test/newer.apk", "D1").await.unwrap();

    let job = store.take_next("D1").await.unwrap();
    assert_eq!(job.build_url, "http://example.test/newer.apk");
}

#[tokio::test]
async fn take_next_is_scoped_per_device() {
    let (store, _dir) = open_store().await;

    store.enqueue("http://example.test/build.apk", "D1").await.unwrap();

    assert!(store.take_next("D2").await.is_none());
    assert!(store.take_next("D1").await.is_some());
}

#[tokio::test]
async fn exhausted_job_is_pruned_before_selection() {
    let (store, _dir) = open_store().await;

    let id = store.enqueue("http://example.test/build.apk", "D1").await.unwrap();

    // MAX_ATTEMPTS = 3: three take_next calls exhaust it.
    for _ in 0..3 {
        let job = store.take_next("D1").await.unwrap();
        assert_eq!(job.id, id);
    }

    assert!(store.take_next("D1").await.is_none());
    assert_eq!(store.pending_count("D1").await, 0);
}

#[tokio::test]
async fn complete_removes_the_job() {
    let (store, _dir) = open_store().await;

    let id = store.enqueue("http://example.test/build.apk", "D1").await.unwrap();
    assert_eq!(store.pending_count("D1").await, 1);

    store.complete(id).await.unwrap();
    assert_eq!(store.pending_count("D1").await, 0);
}

#[tokio::test]
async fn clear_all_is_idempotent() {
    let (store, _dir) = open_store().await;

    store.enqueue("http://example.test/a.apk", "D1").await.unwrap();
    store.enqueue("http://example.test/b.apk", "D2").await.unwrap();

    store.clear_all().await.unwrap();
    assert_eq!(store.pending_count("D1").await, 0);
    assert_eq!(store.pending_count("D2").await, 0);

    // Idempotent: clearing an already-empty store is not an error.
    store.clear_all().await.unwrap();
}
