use locflow_core::ManifestError;
use thiserror::Error;

/// Walker errors.
#[derive(Debug, Error)]
pub enum WalkError {
    /// The manifest could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A manifest record failed to parse; fatal for this manifest.
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Convenience result type for walker operations.
pub type WalkResult<T> = Result<T, WalkError>;
