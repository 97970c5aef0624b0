//! Error types for the device-agent transport, job store, and CLI boundary.

use thiserror::Error;

/// Failure talking to a phone's on-device agent, or performing an operation on it.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("device {phone_id} did not respond")]
    Unreachable { phone_id: String },

    #[error("device {phone_id}: device root unavailable")]
    NoDeviceRoot { phone_id: String },

    #[error("device {phone_id}: install of {remote_path} failed: {reason}")]
    InstallFailed {
        phone_id: String,
        remote_path: String,
        reason: String,
    },

    #[error("device {phone_id}: push of {local} to {remote} failed: {reason}")]
    PushFailed {
        phone_id: String,
        local: String,
        remote: String,
        reason: String,
    },

    #[error("device {phone_id}: reboot failed: {reason}")]
    RebootFailed { phone_id: String, reason: String },

    #[error("device {phone_id}: {operation} failed: {reason}")]
    OperationFailed {
        phone_id: String,
        operation: String,
        reason: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl DeviceError {
    pub fn unreachable(phone_id: impl Into<String>) -> Self {
        Self::Unreachable {
            phone_id: phone_id.into(),
        }
    }

    pub fn operation_failed(
        phone_id: impl Into<String>,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::OperationFailed {
            phone_id: phone_id.into(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// The `phone_id` the failure was reported against, when known.
    pub fn phone_id(&self) -> Option<&str> {
        match self {
            Self::Unreachable { phone_id }
            | Self::NoDeviceRoot { phone_id }
            | Self::InstallFailed { phone_id, .. }
            | Self::PushFailed { phone_id, .. }
            | Self::RebootFailed { phone_id, .. }
            | Self::OperationFailed { phone_id, .. } => Some(phone_id),
            Self::Io(_) => None,
        }
    }
}

/// Failure reading or writing the persistent job store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("job store is temporarily unavailable: {0}")]
    Transient(#[from] sqlx::Error),

    #[error("job store migration failed: {0}")]
    Migration(String),
}

pub type DeviceResult<T> = Result<T, DeviceError>;
pub type StoreResult<T> = Result<T, StoreError>;

/// Top-level error surfaced at the CLI boundary: configuration and startup failures.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {path}: {source}")]
    ConfigParse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("fleet configuration has no phones defined")]
    EmptyFleet,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Device(#[from] DeviceError),
}
