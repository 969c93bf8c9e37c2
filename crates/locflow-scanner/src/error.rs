use std::path::PathBuf;

use thiserror::Error;

/// Scanner errors. Every one of them is fatal for the scan.
#[derive(Debug, Error)]
pub enum ScanError {
    /// A scan directory does not exist or is not a directory.
    #[error("Unknown scan directory: {0}")]
    UnknownScanDir(PathBuf),

    /// A scan directory lies outside the node-local storage root.
    #[error("Scan directory {dir} is outside the local storage root {root}")]
    OutsideLocalRoot {
        /// The offending directory.
        dir: PathBuf,
        /// The configured local storage root.
        root: PathBuf,
    },

    /// An entry could not be read.
    #[error("Cannot read {path}: {source}")]
    Unreadable {
        /// The unreadable entry.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Native IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for scan operations.
pub type ScanResult<T> = Result<T, ScanError>;
