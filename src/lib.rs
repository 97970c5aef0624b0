//! autophoned - orchestrates a fleet of physical Android phones through
//! successive builds of a mobile browser: polling a job queue, installing
//! builds, running configured test cases, and recovering misbehaving phones.
//!
//! # Architecture Overview
//!
//! - [`store`] - the durable, device-partitioned job queue
//! - [`crash`] - the sliding-window crash counter
//! - [`channel`] - supervisor↔worker command and status channels
//! - [`device_agent`] - the phone capability facade
//! - [`test_case`] - the pluggable per-build test capability
//! - [`buildcache`] - the external build-cache client
//! - [`mailer`] - best-effort notification transport
//! - [`worker`] - the per-device state machine
//! - [`supervisor`] - owns and commands every worker
//! - [`config`] - fleet configuration (phones + tunables)
//! - [`models`] - shared data types and error taxonomy
//! - [`constants`] - process-wide tunable defaults
//! - [`utils`] - logging setup

pub mod buildcache;
pub mod channel;
pub mod config;
pub mod constants;
pub mod crash;
pub mod device_agent;
pub mod mailer;
pub mod models;
pub mod store;
pub mod supervisor;
pub mod test_case;
pub mod utils;
pub mod worker;

pub use config::Config;
pub use supervisor::Supervisor;
