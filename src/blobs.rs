//! Ciphertext blob storage on local disk.
//!
//! One file per document under `storage.blob_dir`, named by an opaque
//! reference (`<uuid>.enc`). Files hold only the encryption envelope and
//! are written atomically with owner-only permissions.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn open(dir: &Path) -> io::Result<Self> {
        fs::create_dir_all(dir)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
        }
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    /// A fresh reference, unrelated to the document's filename.
    pub fn new_reference() -> String {
        format!("{}.enc", uuid::Uuid::new_v4())
    }

    pub fn path_for(&self, reference: &str) -> io::Result<PathBuf> {
        let valid = !reference.is_empty()
            && !reference.starts_with('.')
            && reference
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');
        if !valid {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid blob reference: {:?}", reference),
            ));
        }
        Ok(self.dir.join(reference))
    }

    /// Write to a temp file in the same directory, fsync, then rename.
    pub fn write(&self, reference: &str, bytes: &[u8]) -> io::Result<()> {
        let path = self.path_for(reference)?;
        let tmp = self.dir.join(format!(".{}.tmp", reference));

        let result = (|| {
            let mut file = open_owner_only(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)
        })();

        if result.is_err() {
            let _ = fs::remove_file(&tmp);
        }
        result
    }

    pub fn read(&self, reference: &str) -> io::Result<Vec<u8>> {
        fs::read(self.path_for(reference)?)
    }

    /// Remove a blob. Removing a missing blob is not an error.
    pub fn remove(&self, reference: &str) -> io::Result<()> {
        match fs::remove_file(self.path_for(reference)?) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }

    pub fn exists(&self, reference: &str) -> bool {
        self.path_for(reference).map(|p| p.exists()).unwrap_or(false)
    }
}

#[cfg(unix)]
fn open_owner_only(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> io::Result<fs::File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_read_remove() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(&tmp.path().join("blobs")).unwrap();
        let r = BlobStore::new_reference();

        store.write(&r, b"LXV1...").unwrap();
        assert!(store.exists(&r));
        assert_eq!(store.read(&r).unwrap(), b"LXV1...");

        store.remove(&r).unwrap();
        assert!(!store.exists(&r));
        store.remove(&r).unwrap();
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path()).unwrap();
        store.write(&BlobStore::new_reference(), b"x").unwrap();
        let names: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".enc"));
    }

    #[test]
    fn test_rejects_path_traversal() {
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path()).unwrap();
        assert!(store.path_for("../secret.key").is_err());
        assert!(store.path_for("a/b.enc").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.read("..").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_blob_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let tmp = TempDir::new().unwrap();
        let store = BlobStore::open(tmp.path()).unwrap();
        let r = BlobStore::new_reference();
        store.write(&r, b"x").unwrap();
        let mode = fs::metadata(store.path_for(&r).unwrap()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
