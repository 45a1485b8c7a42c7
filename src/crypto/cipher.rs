//! AES-256-GCM envelope format.
//!
//! ```text
//! magic "LXV1" (4) | nonce (12) | ciphertext || tag (16)
//! ```
//!
//! The magic is bound as associated data, so a header rewrite fails
//! authentication just like a ciphertext bit flip.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use super::error::{CryptoError, CryptoResult};
use super::key::SecretKey;

/// Envelope format marker.
pub const MAGIC: &[u8; 4] = b"LXV1";

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

const HEADER_LEN: usize = MAGIC.len() + NONCE_LEN;

/// Encrypt `plaintext` under a fresh random nonce.
pub fn seal(key: &SecretKey, plaintext: &[u8]) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut nonce = [0u8; NONCE_LEN];
    rand::thread_rng().fill_bytes(&mut nonce);

    let ciphertext = cipher
        .encrypt(
            Nonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad: MAGIC,
            },
        )
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt an envelope produced by [`seal`].
///
/// Every failure (short input, unknown magic, wrong key, tampering) is
/// reported as [`CryptoError::Decryption`].
pub fn open(key: &SecretKey, envelope: &[u8]) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if envelope.len() < HEADER_LEN + TAG_LEN || &envelope[..MAGIC.len()] != MAGIC {
        return Err(CryptoError::Decryption);
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|_| CryptoError::Decryption)?;
    let nonce = Nonce::from_slice(&envelope[MAGIC.len()..HEADER_LEN]);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &envelope[HEADER_LEN..],
                aad: MAGIC,
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Decryption)
}
