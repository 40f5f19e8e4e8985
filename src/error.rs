//! Error types for ccengine.

use thiserror::Error;

use crate::platform::PlatformError;

/// Common error type for ccengine.
#[derive(Error, Debug)]
pub enum CcError {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Validation error for authoring input.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// Command or document store error.
    ///
    /// Store backends convert their own errors into this variant.
    #[error("store error: {0}")]
    Store(String),

    /// Chat platform error that escaped a capability boundary.
    #[error("platform error: {0}")]
    Platform(#[from] PlatformError),
}

/// Result type alias for ccengine operations.
pub type Result<T> = std::result::Result<T, CcError>;
