//! Timeout and delay constants for worker and job-store operations.

use std::time::Duration;

/// How long a worker blocks on its command channel when idle with no job.
pub const PHONE_COMMAND_QUEUE_TIMEOUT: Duration = Duration::from_secs(10);

/// Sleep between install/device-recovery retry attempts.
pub const PHONE_RETRY_WAIT: Duration = Duration::from_secs(15);

/// Minimum interval between opportunistic health pings while idle.
pub const PHONE_PING_INTERVAL: Duration = Duration::from_secs(900);

/// Sliding window over which recent worker crashes are counted.
pub const PHONE_CRASH_WINDOW: Duration = Duration::from_secs(30);

/// Delay before retrying a job-store operation after a transient storage error.
pub const SQL_RETRY_DELAY: Duration = Duration::from_secs(60);

/// How long the supervisor waits for a worker to exit after `Stop`, before abandoning it.
pub fn shutdown_join_timeout() -> Duration {
    PHONE_COMMAND_QUEUE_TIMEOUT * 2
}
