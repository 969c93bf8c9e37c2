//! Scheduler client error types.

use thiserror::Error;

/// Errors raised by scheduler operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level HTTP failure.
    #[error("Scheduler request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The scheduler answered with a non-success status.
    #[error("Scheduler rejected {op}: status {status}: {body}")]
    Status {
        /// Operation name.
        op: &'static str,
        /// HTTP status code.
        status: u16,
        /// Response body, best effort.
        body: String,
    },

    /// The scheduler host does not resolve. User-actionable: the pod DNS
    /// name is derived from the pod IP and the run namespace.
    #[error("Scheduler host {host} cannot be resolved; check cluster DNS and the run namespace")]
    UnknownHost {
        /// Host that failed to resolve.
        host: String,
    },

    /// Pod lifecycle operation failed.
    #[error("Scheduler pod operation failed: {0}")]
    Pod(String),

    /// The scheduler pod reached a state the bring-up protocol does not
    /// know how to recover from.
    #[error("Scheduler pod is in unexpected state {0:?}")]
    UnexpectedPodState(String),

    /// An operation needing a scheduler address ran before registration.
    #[error("Scheduler client is not registered yet")]
    NotRegistered,

    /// The process-wide shutdown signal fired mid-operation.
    #[error("Operation cancelled by shutdown")]
    Cancelled,

    /// Native IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for scheduler operations.
pub type ClientResult<T> = Result<T, ClientError>;
