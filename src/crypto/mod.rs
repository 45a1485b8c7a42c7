//! Encryption at rest, password hashing, and integrity hashing.
//!
//! [`CryptoService`] is built once per deployment from the key file and
//! the configured Argon2 cost, then shared behind an `Arc`. It holds no
//! mutable state, so concurrent callers need no coordination.

pub mod cipher;
pub mod error;
pub mod key;
pub mod password;

use argon2::Argon2;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

pub use error::{CryptoError, CryptoResult};
pub use key::{KeyManager, SecretKey};

use crate::config::PasswordHashingConfig;

pub struct CryptoService {
    keys: KeyManager,
    argon2: Argon2<'static>,
    /// Hash of a random password, verified against when a username is
    /// unknown so the response time matches a wrong-password attempt.
    dummy_hash: String,
}

impl std::fmt::Debug for CryptoService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoService")
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}

impl CryptoService {
    pub fn new(keys: KeyManager, hashing: &PasswordHashingConfig) -> CryptoResult<Self> {
        let argon2 = password::hasher(hashing)?;
        let decoy = hex::encode(SecretKey::generate().as_bytes());
        let dummy_hash = password::hash_password(&argon2, &decoy)?;
        Ok(Self {
            keys,
            argon2,
            dummy_hash,
        })
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
        cipher::seal(self.keys.key(), plaintext)
    }

    /// Plaintext is zeroized when the returned buffer drops.
    pub fn decrypt_bytes(&self, envelope: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
        cipher::open(self.keys.key(), envelope)
    }

    pub fn hash_password(&self, password: &str) -> CryptoResult<String> {
        password::hash_password(&self.argon2, password)
    }

    pub fn verify_password(&self, hash: &str, password: &str) -> bool {
        password::verify_password(&self.argon2, hash, password)
    }

    /// Burn one verification's worth of work; always returns `false`.
    pub fn verify_dummy(&self, password: &str) -> bool {
        let _ = password::verify_password(&self.argon2, &self.dummy_hash, password);
        false
    }

    /// Lowercase hex SHA-256 of `bytes`.
    pub fn integrity_hash(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> CryptoService {
        CryptoService::new(
            KeyManager::from_key(SecretKey::from_bytes([9u8; 32])),
            &PasswordHashingConfig {
                memory_kib: 1024,
                iterations: 1,
                parallelism: 1,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_encrypt_decrypt() {
        let svc = service();
        let sealed = svc.encrypt_bytes(b"Lease agreement").unwrap();
        assert_ne!(&sealed[cipher::MAGIC.len()..], b"Lease agreement");
        assert_eq!(svc.decrypt_bytes(&sealed).unwrap().as_slice(), b"Lease agreement");
    }

    #[test]
    fn test_dummy_never_verifies() {
        let svc = service();
        assert!(!svc.verify_dummy(""));
        assert!(!svc.verify_dummy("anything"));
    }

    #[test]
    fn test_integrity_hash_is_sha256_hex() {
        assert_eq!(
            CryptoService::integrity_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_debug_hides_key() {
        let shown = format!("{:?}", service());
        assert!(shown.contains("REDACTED"));
    }
}
