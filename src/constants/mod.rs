//! Process-wide tunable constants.
//!
//! Centralizes the literal defaults named throughout the design: retry
//! counts, timeouts, and file-system defaults. Each is individually
//! overridable through [`crate::config::TuningConfig`].

pub mod defaults;
pub mod limits;
pub mod timeouts;

pub use defaults::*;
pub use limits::*;
pub use timeouts::*;
