//! Streaming walker over task manifests.
//!
//! A task's bash wrapper runs the scanner before and after user code,
//! leaving input and output manifests in the task work directory. This
//! crate streams those manifests, hands each record to a visitor as a
//! location-aware [`locflow_path::LocalPath`], and answers point lookups
//! with a parallel short-circuiting scan.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod error;
pub mod factory;
pub mod visitor;
pub mod walker;

pub use error::{WalkError, WalkResult};
pub use factory::LocalPathFactory;
pub use visitor::{ManifestVisitor, VisitOutcome};
pub use walker::{fake_path, LocalFileWalker};
