//! The persistent, device-partitioned job queue.
//!
//! Backed by a single-table SQLite database. Mutating operations
//! (`enqueue`, `complete`, `clear_all`) retry indefinitely on transient
//! storage errors, notifying the mailer once per call after
//! [`SQL_MAX_RETRIES`] failed attempts. `take_next` and `pending_count`
//! are read paths the worker's main loop depends on staying responsive,
//! so they give up immediately instead: `None` / `0` rather than blocking
//! the worker behind a wedged database.

use crate::constants::{MAX_ATTEMPTS, SQL_MAX_RETRIES, SQL_RETRY_DELAY};
use crate::mailer::Mailer;
use crate::models::{Job, StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use std::time::Duration;

/// Durable, device-partitioned job queue.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Appends a new job for `device_id`. Retries on transient storage errors.
    async fn enqueue(&self, build_url: &str, device_id: &str) -> StoreResult<i64>;

    /// Best-effort count of undeleted jobs for `device_id`; `0` on storage error.
    async fn pending_count(&self, device_id: &str) -> i64;

    /// Prunes exhausted jobs, then hands out and marks attempted the newest
    /// remaining job for `device_id`. `None` on empty queue or storage error.
    async fn take_next(&self, device_id: &str) -> Option<Job>;

    /// Deletes the job with the given id. Retries on transient storage errors.
    async fn complete(&self, job_id: i64) -> StoreResult<()>;

    /// Deletes every job in the store. Retries on transient storage errors.
    async fn clear_all(&self) -> StoreResult<()>;
}

/// SQLite-backed [`JobStore`].
pub struct SqliteJobStore {
    pool: SqlitePool,
    mailer: Arc<dyn Mailer>,
}

impl SqliteJobStore {
    /// Opens (creating if absent) the job database at `path` and applies its schema.
    pub async fn open(path: &str, mailer: Arc<dyn Mailer>) -> StoreResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(5_000));

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self { pool, mailer };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> StoreResult<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS jobs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                created TEXT NOT NULL,
                last_attempt TEXT,
                build_url TEXT NOT NULL,
                attempts INTEGER NOT NULL DEFAULT 0,
                device TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_device ON jobs(device)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Migration(e.to_string()))?;

        Ok(())
    }

    /// Runs `attempt` against the pool, retrying on transient sqlx errors until it
    /// succeeds, sending a single mailer notification once `SQL_MAX_RETRIES` is
    /// exceeded. Mirrors the retry/backoff policy used for all mutating job-store
    /// operations.
    async fn retrying<F, Fut, T>(&self, what: &str, mut attempt_fn: F) -> StoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
    {
        let mut attempt: u32 = 0;
        let mut email_sent = false;
        loop {
            attempt += 1;
            match attempt_fn().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    log::warn!("job store: attempt {attempt} to {what} failed: {e}");
                    if attempt > SQL_MAX_RETRIES && !email_sent {
                        email_sent = true;
                        if let Err(mail_err) = self
                            .mailer
                            .send(
                                "Unable to access jobs database",
                                &format!(
                                    "Attempt {attempt} failed to {what}. Please check the logs."
                                ),
                            )
                            .await
                        {
                            log::warn!("job store: failed to send notification: {mail_err}");
                        }
                    }
                    tokio::time::sleep(SQL_RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn enqueue(&self, build_url: &str, device_id: &str) -> StoreResult<i64> {
        let now = Utc::now();
        self.retrying("insert job", || {
            let pool = &self.pool;
            async move {
                let result = sqlx::query(
                    "INSERT INTO jobs (created, last_attempt, build_url, attempts, device)
                     VALUES (?, NULL, ?, 0, ?)",
                )
                .bind(now.to_rfc3339())
                .bind(build_url)
                .bind(device_id)
                .execute(pool)
                .await?;
                Ok(result.last_insert_rowid())
            }
        })
        .await
    }

    async fn pending_count(&self, device_id: &str) -> i64 {
        match sqlx::query("SELECT COUNT(*) AS c FROM jobs WHERE device = ?")
            .bind(device_id)
            .fetch_one(&self.pool)
            .await
        {
            Ok(row) => row.get::<i64, _>("c"),
            Err(e) => {
                log::warn!("job store: pending_count failed, returning 0: {e}");
                0
            }
        }
    }

    async fn take_next(&self, device_id: &str) -> Option<Job> {
        let mut tx = self.pool.begin().await.ok()?;

        sqlx::query("DELETE FROM jobs WHERE device = ? AND attempts >= ?")
            .bind(device_id)
            .bind(MAX_ATTEMPTS)
            .execute(&mut *tx)
            .await
            .ok()?;

        let row = sqlx::query(
            "SELECT id, created, last_attempt, build_url, attempts, device
             FROM jobs WHERE device = ? ORDER BY created DESC LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(&mut *tx)
        .await
        .ok()??;

        let id: i64 = row.get("id");
        let created: String = row.get("created");
        let build_url: String = row.get("build_url");
        let attempts: i64 = row.get::<i64, _>("attempts") + 1;
        let now = Utc::now();

        sqlx::query("UPDATE jobs SET attempts = ?, last_attempt = ? WHERE id = ?")
            .bind(attempts)
            .bind(now.to_rfc3339())
            .bind(id)
            .execute(&mut *tx)
            .await
            .ok()?;

        tx.commit().await.ok()?;

        Some(Job {
            id,
            created_at: created.parse::<DateTime<Utc>>().unwrap_or(now),
            last_attempt_at: Some(now),
            build_url,
            attempts,
            device_id: device_id.to_string(),
        })
    }

    async fn complete(&self, job_id: i64) -> StoreResult<()> {
        self.retrying("delete completed job", || {
            let pool = &self.pool;
            async move {
                sqlx::query("DELETE FROM jobs WHERE id = ?")
                    .bind(job_id)
                    .execute(pool)
                    .await?;
                Ok(())
            }
        })
        .await
    }

    async fn clear_all(&self) -> StoreResult<()> {
        self.retrying("clear all jobs", || {
            let pool = &self.pool;
            async move {
                sqlx::query("DELETE FROM jobs").execute(pool).await?;
                Ok(())
            }
        })
        .await
    }
}
