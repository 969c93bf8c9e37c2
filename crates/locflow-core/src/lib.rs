//! locflow core - manifest format and scheduler wire types.
//!
//! This crate provides:
//! - The semicolon-delimited manifest record format emitted by the node-side
//!   scanner and consumed by the walker
//! - The high-precision timestamp codec used inside manifest records
//! - The JSON types exchanged with the remote scheduler
//! - The retry policy shared by the FTP and scheduler bring-up paths

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod record;
pub mod retry;
pub mod time;
pub mod wire;

pub use error::{ManifestError, ManifestResult};
pub use record::{FileRecord, FileType};
pub use retry::RetryPolicy;
pub use time::{format_file_time, parse_file_time};
pub use wire::{
    Dag, DagEdge, DagVertex, FileLocation, FileLocationUpdate, RunConfig, SymlinkSpec, TaskConfig,
    TaskHandle, TaskStateInfo,
};
