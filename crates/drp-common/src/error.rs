//! Error types for DRP

use crate::types::DigestAlgorithm;
use thiserror::Error;

/// Result type alias for DRP operations
pub type Result<T> = std::result::Result<T, DrpError>;

/// Main error type for DRP
#[derive(Error, Debug)]
pub enum DrpError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Checksum mismatch ({algorithm}): expected {expected}, got {actual}")]
    ChecksumMismatch {
        algorithm: DigestAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("Invalid digest value for {algorithm}: {value}")]
    InvalidDigest {
        algorithm: DigestAlgorithm,
        value: String,
    },

    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}
