//! Default paths and file names used when not overridden by configuration.

/// Default path to the fleet configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "fleet.toml";

/// File name of the job-store's SQLite database, relative to the working directory.
pub const DEFAULT_JOB_STORE_FILE: &str = "jobs.sqlite3";

/// Remote file name a build is pushed to on the device before install.
pub const BUILD_APK_NAME: &str = "build.apk";

/// Default log level when neither `--log-level` nor `RUST_LOG` is set.
pub const DEFAULT_LOG_LEVEL: &str = "info";
