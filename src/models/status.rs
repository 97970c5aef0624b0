//! The worker status values reported over the status channel.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// The operational state of a single worker, also its externally reported status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    Idle,
    Installing,
    Working,
    Rebooting,
    /// Transient error: phone is unreachable but recovery is still attempted.
    Disconnected,
    /// Permanent error: no automatic recovery until an explicit `enable`.
    Disabled,
}

impl WorkerState {
    pub fn is_error(self) -> bool {
        matches!(self, Self::Disconnected | Self::Disabled)
    }
}

/// A single status transition emitted by a worker.
///
/// Serializes to JSON with exactly the keys `phone_id`, `status`,
/// `current_build`, `msg`, and `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkerStatus {
    pub phone_id: String,
    #[serde(rename = "status")]
    pub state: WorkerState,
    pub current_build: Option<f64>,
    pub msg: Option<String>,
    pub timestamp: u64,
}

impl WorkerStatus {
    pub fn new(phone_id: impl Into<String>, state: WorkerState) -> Self {
        Self {
            phone_id: phone_id.into(),
            state,
            current_build: None,
            msg: None,
            timestamp: now_secs(),
        }
    }

    pub fn with_build(mut self, current_build: Option<f64>) -> Self {
        self.current_build = current_build;
        self
    }

    pub fn with_msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = Some(msg.into());
        self
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
