//! Common error types for Stratus.

use thiserror::Error;

/// Top-level error type for Stratus storage operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Container or blob does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Container still holds at least one blob.
    #[error("Container is not empty: {0}")]
    NotEmpty(String),

    /// Storage credentials are unusable (e.g. base path not writable).
    #[error("Credentials error: {0}")]
    Credentials(String),

    /// Signature timestamp is older than the required maximum age.
    #[error("The signature has expired")]
    SignatureExpired,

    /// Signature verification failed or the token is malformed.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    /// Operation is not implemented by this backend.
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Generic storage failure (lock timeout, invalid name, etc.).
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
