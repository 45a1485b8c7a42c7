//! Argon2id password hashing.
//!
//! Hashes are stored as PHC strings, so the salt and cost parameters
//! travel with each hash and older hashes keep verifying after the
//! configured cost changes.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};

use super::error::{CryptoError, CryptoResult};
use crate::config::PasswordHashingConfig;

/// Build an Argon2id hasher from the configured cost.
pub fn hasher(cfg: &PasswordHashingConfig) -> CryptoResult<Argon2<'static>> {
    let params = Params::new(cfg.memory_kib, cfg.iterations, cfg.parallelism, None)
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash `password` under a fresh random salt.
pub fn hash_password(argon2: &Argon2<'_>, password: &str) -> CryptoResult<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CryptoError::PasswordHash(e.to_string()))
}

/// Check `password` against a stored PHC hash. A malformed hash never
/// verifies.
pub fn verify_password(argon2: &Argon2<'_>, hash: &str, password: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => argon2
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}
