//! Error taxonomy for vault operations.
//!
//! Every failure a caller can observe is a distinct [`VaultError`]
//! variant, so authorization, decryption, and collaborator failures must
//! be handled explicitly. Each variant maps to a stable machine-readable
//! [`code`](VaultError::code) and a [`public_message`](VaultError::public_message)
//! that never echoes internals (key material, SQL, file paths).

use thiserror::Error;

use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum VaultError {
    /// Unknown username or wrong password.
    #[error("Authentication failed")]
    AuthenticationFailure,

    /// Registration with a username that already exists.
    #[error("Username already exists: {0}")]
    DuplicateUsername(String),

    /// Wrong key, unknown envelope, or tampered ciphertext.
    #[error("Decryption failed")]
    Decryption,

    /// Decrypted bytes do not match the recorded content hash.
    #[error("Integrity check failed for document {0}")]
    IntegrityMismatch(String),

    /// Unknown document or user.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The requester does not own the resource.
    #[error("Access to document {0} is forbidden")]
    Forbidden(String),

    #[error("Text extraction failed: {0}")]
    Extraction(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Answer synthesis failed: {0}")]
    Synthesis(String),

    /// Retrieval backend failure; queries fail closed.
    #[error("Semantic index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Audit write failed: {0}")]
    AuditWrite(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type for vault operations.
pub type VaultResult<T> = Result<T, VaultError>;

impl VaultError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        VaultError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Stable machine-readable code, used in HTTP error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            VaultError::AuthenticationFailure => "authentication_failed",
            VaultError::DuplicateUsername(_) => "duplicate_username",
            VaultError::Decryption => "decryption_failed",
            VaultError::IntegrityMismatch(_) => "integrity_mismatch",
            VaultError::NotFound { .. } => "not_found",
            VaultError::Forbidden(_) => "forbidden",
            VaultError::Extraction(_) => "extraction_failed",
            VaultError::Embedding(_) => "embedding_failed",
            VaultError::Synthesis(_) => "synthesis_failed",
            VaultError::IndexUnavailable(_) => "index_unavailable",
            VaultError::AuditWrite(_) => "audit_write_failed",
            VaultError::InvalidInput(_) => "bad_request",
            VaultError::Storage(_) => "storage_error",
            VaultError::Database(_) => "database_error",
            VaultError::Configuration(_) => "configuration_error",
        }
    }

    /// Message safe to show to an end user.
    pub fn public_message(&self) -> String {
        match self {
            VaultError::AuthenticationFailure => "Invalid credentials".to_string(),
            VaultError::DuplicateUsername(_) => "Username already exists".to_string(),
            VaultError::Decryption => {
                "The document could not be decrypted; it may have been tampered with".to_string()
            }
            VaultError::IntegrityMismatch(_) => {
                "The document failed its integrity check".to_string()
            }
            VaultError::NotFound { kind, .. } => format!("{} not found", kind),
            VaultError::Forbidden(_) => "You do not have access to this document".to_string(),
            VaultError::Extraction(_) => "The document text could not be extracted".to_string(),
            VaultError::Embedding(_) => {
                "The embedding service is unavailable; try again later".to_string()
            }
            VaultError::Synthesis(_) => {
                "The answer service is unavailable; try again later".to_string()
            }
            VaultError::IndexUnavailable(_) => {
                "Search is temporarily unavailable; try again later".to_string()
            }
            VaultError::AuditWrite(_) => "The audit log is unavailable".to_string(),
            VaultError::InvalidInput(msg) => msg.clone(),
            VaultError::Storage(_) | VaultError::Database(_) | VaultError::Configuration(_) => {
                "Internal error".to_string()
            }
        }
    }
}

impl From<CryptoError> for VaultError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::Decryption => VaultError::Decryption,
            CryptoError::Io(e) => VaultError::Storage(e),
            other => VaultError::Configuration(other.to_string()),
        }
    }
}
