use thiserror::Error;

/// Manifest parsing errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A record line had an unexpected number of columns.
    #[error("Record has {count} columns, expected 8 (or 2 for a missing symlink target): {line}")]
    BadArity {
        /// Number of semicolon-separated columns found.
        count: usize,
        /// The offending line.
        line: String,
    },

    /// The existence flag was neither `0` nor `1`.
    #[error("Invalid existence flag {flag:?} in record: {line}")]
    BadExistsFlag {
        /// The flag column as found.
        flag: String,
        /// The offending line.
        line: String,
    },

    /// The size column was not an unsigned integer.
    #[error("Invalid size {size:?} in record: {line}")]
    BadSize {
        /// The size column as found.
        size: String,
        /// The offending line.
        line: String,
    },

    /// The file type column was not one of the known type strings.
    #[error("Unknown file type {0:?}")]
    UnknownFileType(String),

    /// A timestamp column failed to parse.
    #[error("Invalid file time {value:?}: {source}")]
    BadFileTime {
        /// The timestamp column as found.
        value: String,
        /// Underlying chrono parse error.
        source: chrono::ParseError,
    },

    /// Native IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type for manifest operations.
pub type ManifestResult<T> = Result<T, ManifestError>;
