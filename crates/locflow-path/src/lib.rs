//! Location-aware file paths.
//!
//! A [`LocalPath`] wraps a task-visible path. Reads resolve the file's
//! current location through the scheduler and either open locally or stream
//! from the owning node's FTP daemon; mutations promote the file to the
//! local node first (download-on-write) and report the resulting location
//! back to the scheduler.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod ftp;
pub mod path;
pub mod writable;

pub use error::{PathError, PathResult};
pub use ftp::{FtpSettings, FtpTransport};
pub use path::{LocalPath, LocalRead};
pub use writable::WritableFile;
