//! Error types for configuration loading and validation.

use std::path::PathBuf;

use thiserror::Error;

/// Failures raised while resolving the effective configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {path}")]
    Read {
        /// Path that failed to load.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid JSON.
    #[error("failed to parse config file {path}")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Underlying decode failure.
        #[source]
        source: serde_json::Error,
    },
    /// A field value violates a documented constraint.
    #[error("invalid config field {section}.{field}: {reason}")]
    InvalidField {
        /// Configuration section, e.g. `prefetch.media`.
        section: String,
        /// Field name within the section.
        field: String,
        /// Constraint that was violated.
        reason: &'static str,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
