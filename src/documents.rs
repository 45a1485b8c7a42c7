//! Document lifecycle: encrypted ingest, authorized fetch, cascading delete.
//!
//! Metadata lives in the `documents` table, ciphertext in the [`BlobStore`].
//! Plaintext only exists in memory, in zeroizing buffers.
//!
//! Operations on one document are serialized by a per-document
//! [`tokio::sync::RwLock`]: fetches and index commits share it, deletes
//! take it exclusively.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde_json::json;
use sqlx::{Row, SqlitePool};
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use lexvault_core::index::SemanticIndex;
use lexvault_core::models::{ActionKind, Document, Identity};

use crate::audit::AuditLog;
use crate::blobs::BlobStore;
use crate::crypto::CryptoService;
use crate::error::{VaultError, VaultResult};

pub const DEFAULT_DESCRIPTION: &str = "No description available.";

pub struct DocumentStore {
    pool: SqlitePool,
    blobs: BlobStore,
    crypto: Arc<CryptoService>,
    audit: Arc<AuditLog>,
    index: Arc<dyn SemanticIndex>,
    locks: Mutex<HashMap<String, Arc<RwLock<()>>>>,
}

impl DocumentStore {
    pub fn new(
        pool: SqlitePool,
        blobs: BlobStore,
        crypto: Arc<CryptoService>,
        audit: Arc<AuditLog>,
        index: Arc<dyn SemanticIndex>,
    ) -> Self {
        Self {
            pool,
            blobs,
            crypto,
            audit,
            index,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Encrypt and persist `plaintext` as a new document owned by `owner`.
    pub async fn ingest(
        &self,
        owner: &Identity,
        filename: &str,
        plaintext: &[u8],
        description: Option<&str>,
    ) -> VaultResult<Document> {
        let filename = sanitize_filename(filename)?;
        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DESCRIPTION);

        let doc = Document {
            id: uuid::Uuid::new_v4().to_string(),
            filename,
            owner_id: owner.user_id.clone(),
            ciphertext_ref: BlobStore::new_reference(),
            content_hash: CryptoService::integrity_hash(plaintext),
            uploaded_at: chrono::Utc::now().timestamp(),
            description: description.to_string(),
            indexed_at: None,
        };

        let envelope = self.crypto.encrypt_bytes(plaintext)?;
        self.blobs.write(&doc.ciphertext_ref, &envelope)?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO documents (id, filename, owner_id, ciphertext_ref, content_hash,
                                   uploaded_at, description, indexed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.filename)
        .bind(&doc.owner_id)
        .bind(&doc.ciphertext_ref)
        .bind(&doc.content_hash)
        .bind(doc.uploaded_at)
        .bind(&doc.description)
        .execute(&self.pool)
        .await;

        if let Err(e) = inserted {
            if let Err(rm) = self.blobs.remove(&doc.ciphertext_ref) {
                error!(document_id = %doc.id, error = %rm, "Failed to remove orphaned blob");
            }
            return Err(e.into());
        }

        info!(document_id = %doc.id, user_id = %owner.user_id, bytes = plaintext.len(), "Stored document");
        self.audit
            .record(
                &owner.user_id,
                ActionKind::Upload,
                json!({ "document_id": doc.id, "filename": doc.filename }),
            )
            .await;

        Ok(doc)
    }

    /// Decrypt a document for its owner.
    pub async fn fetch(
        &self,
        document_id: &str,
        requester: &Identity,
    ) -> VaultResult<(Document, Zeroizing<Vec<u8>>)> {
        let _guard = self.read_lock(document_id).await;
        let doc = self.authorize(document_id, requester).await?;

        let envelope = self.blobs.read(&doc.ciphertext_ref)?;
        let plaintext = self.crypto.decrypt_bytes(&envelope).map_err(|e| {
            warn!(document_id, "Decryption failed");
            VaultError::from(e)
        })?;

        if CryptoService::integrity_hash(&plaintext) != doc.content_hash {
            warn!(document_id, "Decrypted content does not match its recorded hash");
            return Err(VaultError::IntegrityMismatch(document_id.to_string()));
        }

        Ok((doc, plaintext))
    }

    /// Remove a document, its blob, and its indexed chunks.
    pub async fn delete(&self, document_id: &str, requester: &Identity) -> VaultResult<Document> {
        let _guard = self.write_lock(document_id).await;
        let doc = self.authorize(document_id, requester).await?;

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;

        if let Err(e) = self.blobs.remove(&doc.ciphertext_ref) {
            warn!(document_id, error = %e, "Failed to remove ciphertext blob");
        }
        match self.index.evict_document(document_id).await {
            Ok(n) => info!(document_id, chunks = n, "Evicted chunks"),
            Err(e) => error!(document_id, error = %e, "Failed to evict chunks from index"),
        }

        self.audit
            .record(
                &requester.user_id,
                ActionKind::Delete,
                json!({ "document_id": doc.id, "filename": doc.filename }),
            )
            .await;

        Ok(doc)
    }

    /// The requester's documents, newest first.
    pub async fn list(&self, requester: &Identity) -> VaultResult<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, owner_id, ciphertext_ref, content_hash, uploaded_at,
                   description, indexed_at
            FROM documents
            WHERE owner_id = ?
            ORDER BY uploaded_at DESC, rowid DESC
            "#,
        )
        .bind(&requester.user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    /// Documents whose chunks were never committed, oldest first.
    pub async fn pending(&self, owner_id: Option<&str>) -> VaultResult<Vec<Document>> {
        let rows = sqlx::query(
            r#"
            SELECT id, filename, owner_id, ciphertext_ref, content_hash, uploaded_at,
                   description, indexed_at
            FROM documents
            WHERE indexed_at IS NULL AND (? IS NULL OR owner_id = ?)
            ORDER BY uploaded_at ASC, rowid ASC
            "#,
        )
        .bind(owner_id)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    pub async fn get(&self, document_id: &str) -> VaultResult<Option<Document>> {
        let row = sqlx::query(
            r#"
            SELECT id, filename, owner_id, ciphertext_ref, content_hash, uploaded_at,
                   description, indexed_at
            FROM documents
            WHERE id = ?
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(row_to_document))
    }

    /// Returns `false` if the document no longer exists.
    pub async fn mark_indexed(&self, document_id: &str) -> VaultResult<bool> {
        let result = sqlx::query("UPDATE documents SET indexed_at = ? WHERE id = ?")
            .bind(chrono::Utc::now().timestamp())
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Shared lock on one document; held while committing its chunks.
    pub async fn read_lock(&self, document_id: &str) -> DocumentGuard<'_, OwnedRwLockReadGuard<()>> {
        let guard = self.lock_for(document_id).read_owned().await;
        DocumentGuard::new(self, document_id, guard)
    }

    async fn write_lock(&self, document_id: &str) -> DocumentGuard<'_, OwnedRwLockWriteGuard<()>> {
        let guard = self.lock_for(document_id).write_owned().await;
        DocumentGuard::new(self, document_id, guard)
    }

    async fn authorize(&self, document_id: &str, requester: &Identity) -> VaultResult<Document> {
        let doc = self
            .get(document_id)
            .await?
            .ok_or_else(|| VaultError::not_found("document", document_id))?;
        if doc.owner_id != requester.user_id {
            warn!(document_id, user_id = %requester.user_id, "Rejected access to another user's document");
            return Err(VaultError::Forbidden(document_id.to_string()));
        }
        Ok(doc)
    }

    fn lock_for(&self, document_id: &str) -> Arc<RwLock<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(document_id.to_string())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    /// Drop the map entry for `document_id` once no guard or waiter holds
    /// it. Clones are only taken under the map mutex, so a count of one
    /// cannot race with a new acquirer.
    fn prune_lock(&self, document_id: &str) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks
            .get(document_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(document_id);
        }
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// A held per-document lock. Releasing it forgets the lock entry when
/// nobody else is waiting on the same document.
pub struct DocumentGuard<'a, G> {
    store: &'a DocumentStore,
    document_id: String,
    guard: Option<G>,
}

impl<'a, G> DocumentGuard<'a, G> {
    fn new(store: &'a DocumentStore, document_id: &str, guard: G) -> Self {
        Self {
            store,
            document_id: document_id.to_string(),
            guard: Some(guard),
        }
    }
}

impl<G> Drop for DocumentGuard<'_, G> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.store.prune_lock(&self.document_id);
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        filename: row.get("filename"),
        owner_id: row.get("owner_id"),
        ciphertext_ref: row.get("ciphertext_ref"),
        content_hash: row.get("content_hash"),
        uploaded_at: row.get("uploaded_at"),
        description: row.get("description"),
        indexed_at: row.get("indexed_at"),
    }
}

/// Keep only the final path component of a client-supplied filename.
fn sanitize_filename(filename: &str) -> VaultResult<String> {
    let name = Path::new(filename.trim())
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::trim)
        .unwrap_or("");
    if name.is_empty() {
        return Err(VaultError::InvalidInput("Filename must not be empty".into()));
    }
    Ok(name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::crypto::{KeyManager, SecretKey};
    use crate::db;
    use lexvault_core::index::InMemoryIndex;
    use lexvault_core::models::Role;
    use tempfile::TempDir;

    async fn store(tmp: &TempDir) -> DocumentStore {
        let config = Config::ephemeral(tmp.path());
        let pool = db::open(&config.db).await.unwrap();
        let crypto = Arc::new(
            CryptoService::new(
                KeyManager::from_key(SecretKey::from_bytes([5u8; 32])),
                &config.security.password_hashing,
            )
            .unwrap(),
        );
        let audit = Arc::new(AuditLog::open(pool.clone(), &config.audit).await.unwrap());
        DocumentStore::new(
            pool,
            BlobStore::open(&config.storage.blob_dir).unwrap(),
            crypto,
            audit,
            Arc::new(InMemoryIndex::new()),
        )
    }

    fn owner() -> Identity {
        Identity {
            user_id: "owner-1".into(),
            username: "alice".into(),
            role: Role::User,
        }
    }

    fn blob_count(tmp: &TempDir) -> usize {
        std::fs::read_dir(tmp.path().join("blobs")).unwrap().count()
    }

    #[tokio::test]
    async fn test_lock_entries_are_released() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let alice = owner();

        for i in 0..200 {
            let err = store.fetch(&format!("missing-{}", i), &alice).await.unwrap_err();
            assert!(matches!(err, VaultError::NotFound { .. }));
        }
        assert_eq!(store.tracked_locks(), 0);

        let doc = store.ingest(&alice, "a.txt", b"alpha", None).await.unwrap();
        let mallory = Identity {
            user_id: "other".into(),
            ..owner()
        };
        assert!(matches!(
            store.fetch(&doc.id, &mallory).await,
            Err(VaultError::Forbidden(_))
        ));
        store.fetch(&doc.id, &alice).await.unwrap();
        assert_eq!(store.tracked_locks(), 0);

        let held = store.read_lock(&doc.id).await;
        let second = store.read_lock(&doc.id).await;
        assert_eq!(store.tracked_locks(), 1);
        drop(held);
        assert_eq!(store.tracked_locks(), 1);
        drop(second);
        assert_eq!(store.tracked_locks(), 0);

        store.delete(&doc.id, &alice).await.unwrap();
        assert_eq!(store.tracked_locks(), 0);
    }

    #[tokio::test]
    async fn test_failed_metadata_insert_leaves_no_blob() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;

        sqlx::query("ALTER TABLE documents RENAME TO documents_moved")
            .execute(&store.pool)
            .await
            .unwrap();

        let err = store
            .ingest(&owner(), "lease.txt", b"Termination clause", None)
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Database(_)));
        assert_eq!(blob_count(&tmp), 0);
    }

    #[tokio::test]
    async fn test_swapped_ciphertext_fails_integrity_check() {
        let tmp = TempDir::new().unwrap();
        let store = store(&tmp).await;
        let alice = owner();

        let doc = store
            .ingest(&alice, "lease.txt", b"Notice period: 30 days.", None)
            .await
            .unwrap();
        assert_eq!(blob_count(&tmp), 1);

        // Validly encrypted under the same key, but not the recorded content.
        let forged = store.crypto.encrypt_bytes(b"Notice period: 3 days.").unwrap();
        store.blobs.write(&doc.ciphertext_ref, &forged).unwrap();

        let err = store.fetch(&doc.id, &alice).await.unwrap_err();
        assert!(matches!(err, VaultError::IntegrityMismatch(ref id) if id == &doc.id));
    }

    #[test]
    fn test_sanitize_filename_strips_directories() {
        assert_eq!(sanitize_filename("contracts/lease.pdf").unwrap(), "lease.pdf");
        assert_eq!(sanitize_filename("  nda.docx ").unwrap(), "nda.docx");
        assert!(sanitize_filename("").is_err());
        assert!(sanitize_filename("   ").is_err());
        assert!(sanitize_filename("..").is_err());
    }
}
