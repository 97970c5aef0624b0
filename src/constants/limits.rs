//! Retry, attempt, and crash-rate limits.

/// A job is pruned from the store once it has been handed out this many times.
pub const MAX_ATTEMPTS: i64 = 3;

/// Install/recovery operations are retried this many times before giving up.
pub const PHONE_RETRY_LIMIT: u32 = 2;

/// Reboots attempted during phone recovery before declaring the phone disconnected.
pub const PHONE_MAX_REBOOTS: u32 = 3;

/// Crashes within `PHONE_CRASH_WINDOW` before a worker self-disables.
pub const PHONE_CRASH_LIMIT: usize = 5;

/// Job-store operations are retried this many times before notifying the mailer.
pub const SQL_MAX_RETRIES: u32 = 10;

/// Retries performed internally by the device agent for a single operation.
pub const DEVICEMANAGER_RETRY_LIMIT: u32 = 8;

/// Bounded capacity of the command channel; full channels drop the oldest entry.
pub const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Bounded capacity of the status channel.
pub const STATUS_CHANNEL_CAPACITY: usize = 64;
