//! Error types for configuration parsing and validation

use hdlrun_backends::BackendError;
use thiserror::Error;

/// Result type for manifest operations
pub type Result<T> = std::result::Result<T, ManifestError>;

/// Errors that can occur while loading `hdlrun.toml`
#[derive(Debug, Error)]
pub enum ManifestError {
    /// I/O error reading the file
    #[error("I/O error: {0}")]
    Io(String),

    /// TOML syntax error or an unrecognised option
    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    /// Well-formed but unusable values
    #[error("Validation error: {0}")]
    Validation(String),

    /// The configuration does not make a valid simulation request
    #[error(transparent)]
    Request(#[from] BackendError),
}
