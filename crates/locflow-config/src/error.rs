use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("Cannot read config file {path}: {source}")]
    Read {
        /// File that failed to load.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A configuration layer failed to parse as TOML.
    #[error("Cannot parse {path}: {source}")]
    Parse {
        /// File (or `<embedded defaults>`) that failed to parse.
        path: String,
        /// Underlying TOML error.
        source: toml::de::Error,
    },

    /// The merged tree did not deserialize into the typed config.
    #[error("Invalid configuration: {0}")]
    Deserialize(toml::de::Error),

    /// A semantic validation failure.
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

/// Convenience result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
