//! Shared error, configuration, telemetry, and id foundations used by
//! every crate in the APEX orchestration kernel workspace.

pub mod config;
pub mod error;
pub mod ids;
pub mod retry;
pub mod telemetry;

pub use config::ApexConfig;
pub use error::{ApexError, ApexResult};
