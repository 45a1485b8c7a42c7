//! Deployment key management.
//!
//! One 256-bit key per deployment, stored in a key file that is created
//! with owner-only permissions on first run and reused afterwards. The
//! key is read once when the [`KeyManager`] is built; after that it is
//! immutable and shared without locking.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use base64::Engine;
use rand::RngCore;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::error::{CryptoError, CryptoResult};

/// Key length in bytes (AES-256).
pub const KEY_LEN: usize = 32;

/// Key wrapper with automatic zeroization on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; KEY_LEN],
}

impl SecretKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Owns the deployment key and the path it was loaded from.
#[derive(Debug)]
pub struct KeyManager {
    path: Option<PathBuf>,
    key: SecretKey,
}

impl KeyManager {
    /// Load the key at `path`, generating and persisting a new one if the
    /// file does not exist.
    pub fn load_or_create(path: &Path) -> CryptoResult<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        match create_owner_only(path) {
            Ok(mut file) => {
                let key = SecretKey::generate();
                file.write_all(key.as_bytes())?;
                file.sync_all()?;
                info!(path = %path.display(), "Generated new deployment encryption key");
                Ok(Self {
                    path: Some(path.to_path_buf()),
                    key,
                })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn_if_exposed(path);
                let key = load_keyfile(path)?;
                Ok(Self {
                    path: Some(path.to_path_buf()),
                    key,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Wrap an in-memory key (tests, tooling).
    pub fn from_key(key: SecretKey) -> Self {
        Self { path: None, key }
    }

    pub fn key(&self) -> &SecretKey {
        &self.key
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

#[cfg(unix)]
fn create_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn create_owner_only(path: &Path) -> std::io::Result<fs::File> {
    OpenOptions::new().write(true).create_new(true).open(path)
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode & 0o777),
                "Key file is readable by group or others; restrict it to 0600"
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}

/// Load key from keyfile (raw 32 bytes or base64-encoded).
pub fn load_keyfile(path: &Path) -> CryptoResult<SecretKey> {
    let mut contents = fs::read(path)?;

    let result = if contents.len() == KEY_LEN {
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(&contents);
        Ok(SecretKey::from_bytes(key))
    } else {
        let cleaned: String = String::from_utf8_lossy(&contents)
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();

        match base64::engine::general_purpose::STANDARD.decode(&cleaned) {
            Ok(mut decoded) if decoded.len() == KEY_LEN => {
                let mut key = [0u8; KEY_LEN];
                key.copy_from_slice(&decoded);
                decoded.zeroize();
                Ok(SecretKey::from_bytes(key))
            }
            Ok(mut decoded) => {
                let len = decoded.len();
                decoded.zeroize();
                Err(CryptoError::InvalidKeyfile(format!(
                    "expected {} bytes, got {}",
                    KEY_LEN, len
                )))
            }
            Err(_) => Err(CryptoError::InvalidKeyfile(format!(
                "expected {} raw bytes or base64, got {} bytes",
                KEY_LEN,
                contents.len()
            ))),
        }
    };

    contents.zeroize();
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_creates_then_reuses_key() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("keys").join("secret.key");

        let first = KeyManager::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(fs::read(&path).unwrap().len(), KEY_LEN);

        let second = KeyManager::load_or_create(&path).unwrap();
        assert_eq!(first.key().as_bytes(), second.key().as_bytes());
    }

    #[cfg(unix)]
    #[test]
    fn test_new_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        KeyManager::load_or_create(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_base64_keyfile_accepted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        let raw = [7u8; KEY_LEN];
        fs::write(&path, base64::engine::general_purpose::STANDARD.encode(raw) + "\n").unwrap();
        let key = load_keyfile(&path).unwrap();
        assert_eq!(key.as_bytes(), &raw);
    }

    #[test]
    fn test_wrong_length_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("secret.key");
        fs::write(&path, [1u8; 16]).unwrap();
        let err = KeyManager::load_or_create(&path).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyfile(_)));
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = SecretKey::from_bytes([0xAB; KEY_LEN]);
        let shown = format!("{:?}", key);
        assert!(shown.contains("REDACTED"));
        assert!(!shown.contains("171"));
    }
}
