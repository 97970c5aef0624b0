//! The unit of work pulled from the job store and handed to a worker.

use chrono::{DateTime, Utc};

/// A single pending request to install `build_url` on `device_id` and run tests against it.
///
/// Rows are created by [`crate::store::JobStore::enqueue`], mutated only by
/// [`crate::store::JobStore::take_next`] (which increments `attempts`), and
/// destroyed by [`crate::store::JobStore::complete`] or by attempt-exhaustion
/// pruning.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub build_url: String,
    pub attempts: i64,
    pub device_id: String,
}
