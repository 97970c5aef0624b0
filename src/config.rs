//! Fleet configuration: phone inventory and process-wide tunables.
//!
//! Loaded from a TOML file (`fleet.toml` by default) via `serde` + `toml`,
//! following the same load-from-path pattern the teacher codebase used for
//! its own configuration, generalized to this domain's `[[phone]]` /
//! `[tuning]` shape.

use crate::models::OrchestratorError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Immutable per-device descriptor, one entry per configured phone.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhoneConfig {
    pub phone_id: String,
    pub ip: String,
    pub sut_cmd_port: u16,
    pub abi: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub os_version: String,
}

/// Process-wide tunables; every field is optional in the configuration file
/// and falls back to the literal default named in its constant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TuningConfig {
    pub devicemanager_retry_limit: u32,
    pub devicemanager_settling_time_secs: Option<u64>,
    pub phone_retry_limit: u32,
    pub phone_retry_wait_secs: u64,
    pub phone_max_reboots: u32,
    pub phone_ping_interval_secs: u64,
    pub phone_command_queue_timeout_secs: u64,
    pub phone_crash_window_secs: u64,
    pub phone_crash_limit: usize,
}

impl Default for TuningConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            devicemanager_retry_limit: DEVICEMANAGER_RETRY_LIMIT,
            devicemanager_settling_time_secs: None,
            phone_retry_limit: PHONE_RETRY_LIMIT,
            phone_retry_wait_secs: PHONE_RETRY_WAIT.as_secs(),
            phone_max_reboots: PHONE_MAX_REBOOTS,
            phone_ping_interval_secs: PHONE_PING_INTERVAL.as_secs(),
            phone_command_queue_timeout_secs: PHONE_COMMAND_QUEUE_TIMEOUT.as_secs(),
            phone_crash_window_secs: PHONE_CRASH_WINDOW.as_secs(),
            phone_crash_limit: PHONE_CRASH_LIMIT,
        }
    }
}

impl TuningConfig {
    pub fn retry_wait(&self) -> Duration {
        Duration::from_secs(self.phone_retry_wait_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.phone_ping_interval_secs)
    }

    pub fn command_queue_timeout(&self) -> Duration {
        Duration::from_secs(self.phone_command_queue_timeout_secs)
    }

    pub fn crash_window(&self) -> Duration {
        Duration::from_secs(self.phone_crash_window_secs)
    }

    pub fn settling_time(&self) -> Option<Duration> {
        self.devicemanager_settling_time_secs.map(Duration::from_secs)
    }
}

/// Top-level fleet configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "phone", default)]
    pub phones: Vec<PhoneConfig>,
    #[serde(default)]
    pub tuning: TuningConfig,
}

impl Config {
    /// Reads and parses the configuration file at `path`. A missing or
    /// unparsable file is a startup error; an empty phone list is rejected
    /// since there would be nothing to supervise.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OrchestratorError> {
        let path = path.as_ref();
        let text =
            std::fs::read_to_string(path).map_err(|source| OrchestratorError::ConfigRead {
                path: path.display().to_string(),
                source,
            })?;

        let config: Config =
            toml::from_str(&text).map_err(|source| OrchestratorError::ConfigParse {
                path: path.display().to_string(),
                source,
            })?;

        if config.phones.is_empty() {
            return Err(OrchestratorError::EmptyFleet);
        }

        Ok(config)
    }
}
