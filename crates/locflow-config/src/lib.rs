//! Configuration for the locflow scheduling subsystem.
//!
//! Loading is layered, lowest precedence first:
//! 1. Embedded `defaults.toml`
//! 2. An optional TOML file passed by the embedding executor
//! 3. `LOCFLOW_*` environment variables
//!
//! The merged tree is deserialized into [`Config`] and validated.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod loader;
pub mod types;
mod validate;

pub use error::{ConfigError, ConfigResult};
pub use types::{BatchConfig, Config, FtpConfig, HostMount, SchedulerConfig, StorageConfig, VolumeClaim};
