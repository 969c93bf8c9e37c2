//! Path operation error types.

use locflow_client::ClientError;
use thiserror::Error;

/// Errors raised by location-aware path operations.
#[derive(Debug, Error)]
pub enum PathError {
    /// Native IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// FTP protocol or transfer failure.
    #[error("FTP transfer failed: {0}")]
    Ftp(#[from] suppaftp::FtpError),

    /// Scheduler interaction failure.
    #[error(transparent)]
    Client(#[from] ClientError),

    /// The blocking FTP worker died.
    #[error("FTP worker failed: {0}")]
    Worker(String),

    /// The process-wide shutdown signal fired mid-transfer.
    #[error("Transfer cancelled by shutdown")]
    Cancelled,
}

impl PathError {
    /// Whether the FTP acquisition retry loop may try again.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Ftp(_) | Self::Worker(_))
    }
}

/// Convenience result type for path operations.
pub type PathResult<T> = Result<T, PathError>;
