//! Error types for login key handling

use thiserror::Error;

/// Errors raised while building login key material
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material of the wrong length
    #[error("Invalid key size: expected {expected}, got {actual}")]
    InvalidKeySize {
        /// Expected size in bytes
        expected: usize,
        /// Actual size in bytes
        actual: usize,
    },

    /// Key material that is not upper-case hexadecimal text
    #[error("Invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// Shared secret missing or empty
    #[error("Shared secret is empty")]
    EmptySecret,
}

/// Result alias for key operations
pub type Result<T> = std::result::Result<T, CryptoError>;
