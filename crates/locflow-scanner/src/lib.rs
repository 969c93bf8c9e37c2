//! Node-side manifest scanner.
//!
//! Invoked from a task's bash wrapper, once on staged inputs before user
//! code and once on outputs afterwards. Walks directories physically,
//! resolves symbolic links against the node-local storage root, and emits
//! the manifest consumed by the walker.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod scan;

pub use error::{ScanError, ScanResult};
pub use scan::{ScanMode, Scanner};
