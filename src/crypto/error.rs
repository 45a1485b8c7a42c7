//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
///
/// `Decryption` deliberately carries no detail: wrong key, truncated
/// envelope, unknown format, and tag mismatch are indistinguishable to
/// callers.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Wrong key, malformed envelope, or tampered ciphertext.
    #[error("Decryption failed")]
    Decryption,

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Key file missing, unreadable, or of the wrong size.
    #[error("Invalid key file: {0}")]
    InvalidKeyfile(String),

    /// Password hashing failed or parameters are invalid.
    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
