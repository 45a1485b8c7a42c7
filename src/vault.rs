//! The per-process facade over every LexVault component.
//!
//! A [`Vault`] is built once from a [`Config`] and shared behind an `Arc`
//! by the CLI and the HTTP server. It holds no per-user state: every
//! operation takes the caller's [`Identity`] explicitly.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};
use zeroize::Zeroizing;

use lexvault_core::answer::AnswerModel;
use lexvault_core::embedding::Embedder;
use lexvault_core::index::SemanticIndex;
use lexvault_core::models::{AuditEntry, Document, Identity, QueryAnswer, Role};

use crate::audit::AuditLog;
use crate::blobs::BlobStore;
use crate::config::Config;
use crate::crypto::{CryptoService, KeyManager};
use crate::documents::DocumentStore;
use crate::embedding::create_embedder;
use crate::error::{VaultError, VaultResult};
use crate::extract::{content_type_for, DefaultExtractor, TextExtractor};
use crate::ingest::IngestionPipeline;
use crate::llm::create_answer_model;
use crate::query::QueryEngine;
use crate::sqlite_index::SqliteIndex;
use crate::users::UserDirectory;
use crate::db;

/// The external services a vault talks to.
pub struct Collaborators {
    pub index: Arc<dyn SemanticIndex>,
    pub embedder: Arc<dyn Embedder>,
    pub model: Arc<dyn AnswerModel>,
    pub extractor: Arc<dyn TextExtractor>,
}

impl Collaborators {
    /// The collaborators named by `config`, with the SQLite index on `pool`.
    pub fn from_config(config: &Config, pool: &SqlitePool) -> Result<Self> {
        Ok(Self {
            index: Arc::new(SqliteIndex::new(pool.clone())),
            embedder: create_embedder(&config.embedding)?,
            model: create_answer_model(&config.llm)?,
            extractor: Arc::new(DefaultExtractor),
        })
    }
}

/// Outcome of the indexing half of an upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum IndexingStatus {
    Indexed { chunks: usize },
    /// The document is stored but not searchable; `reindex` retries it.
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub document: Document,
    pub indexing: IndexingStatus,
}

pub struct Vault {
    config: Config,
    pool: SqlitePool,
    audit: Arc<AuditLog>,
    users: UserDirectory,
    documents: Arc<DocumentStore>,
    pipeline: IngestionPipeline,
    queries: QueryEngine,
}

impl Vault {
    /// Open the database, run migrations, load the key, and build the
    /// collaborators named in `config`.
    pub async fn open(config: Config) -> Result<Self> {
        let pool = db::open(&config.db).await?;
        let collaborators = Collaborators::from_config(&config, &pool)?;
        Self::with_collaborators(config, pool, collaborators).await
    }

    /// Build a vault over an already-migrated pool with explicit
    /// collaborators.
    pub async fn with_collaborators(
        config: Config,
        pool: SqlitePool,
        collaborators: Collaborators,
    ) -> Result<Self> {
        let keys = KeyManager::load_or_create(&config.security.key_file).with_context(|| {
            format!(
                "Failed to load key file {}",
                config.security.key_file.display()
            )
        })?;
        let crypto = Arc::new(CryptoService::new(keys, &config.security.password_hashing)?);
        let blobs = BlobStore::open(&config.storage.blob_dir).with_context(|| {
            format!(
                "Failed to open blob directory {}",
                config.storage.blob_dir.display()
            )
        })?;
        let audit = Arc::new(AuditLog::open(pool.clone(), &config.audit).await?);

        let users = UserDirectory::new(pool.clone(), crypto.clone(), audit.clone());
        let documents = Arc::new(DocumentStore::new(
            pool.clone(),
            blobs,
            crypto,
            audit.clone(),
            collaborators.index.clone(),
        ));
        let pipeline = IngestionPipeline::new(
            documents.clone(),
            collaborators.index.clone(),
            collaborators.extractor.clone(),
            collaborators.embedder.clone(),
            audit.clone(),
            &config,
        );
        let queries = QueryEngine::new(
            collaborators.index,
            collaborators.embedder,
            collaborators.model,
            audit.clone(),
            documents.clone(),
            collaborators.extractor,
            &config,
        );

        Ok(Self {
            config,
            pool,
            audit,
            users,
            documents,
            pipeline,
            queries,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn register(&self, username: &str, password: &str) -> VaultResult<Identity> {
        self.users.register(username, password, Role::User).await
    }

    pub async fn register_with_role(&self, username: &str, password: &str, role: Role) -> VaultResult<Identity> {
        self.users.register(username, password, role).await
    }

    pub async fn login(&self, username: &str, password: &str) -> VaultResult<Identity> {
        self.users.authenticate(username, password).await
    }

    pub async fn logout(&self, identity: &Identity) {
        self.users.logout(identity).await
    }

    /// Store a document encrypted, then index it.
    ///
    /// Only storage failures fail the call. If indexing fails the document
    /// is kept un-indexed and the report says why.
    pub async fn upload(
        &self,
        owner: &Identity,
        filename: &str,
        content: &[u8],
        description: Option<&str>,
    ) -> VaultResult<UploadReport> {
        if content_type_for(filename).is_none() {
            return Err(VaultError::InvalidInput(format!(
                "Unsupported file type: {} (expected .txt, .md, .pdf or .docx)",
                filename
            )));
        }

        let document = self
            .documents
            .ingest(owner, filename, content, description)
            .await?;

        let indexing = match self.pipeline.process(&document.id, owner).await {
            Ok(chunks) => IndexingStatus::Indexed { chunks },
            Err(e) => {
                warn!(document_id = %document.id, error = %e, "Stored document could not be indexed");
                IndexingStatus::Failed {
                    reason: e.public_message(),
                }
            }
        };

        let document = self
            .documents
            .get(&document.id)
            .await?
            .unwrap_or(document);
        Ok(UploadReport { document, indexing })
    }

    pub async fn documents(&self, requester: &Identity) -> VaultResult<Vec<Document>> {
        self.documents.list(requester).await
    }

    pub async fn fetch(
        &self,
        document_id: &str,
        requester: &Identity,
    ) -> VaultResult<(Document, Zeroizing<Vec<u8>>)> {
        self.documents.fetch(document_id, requester).await
    }

    pub async fn delete(&self, document_id: &str, requester: &Identity) -> VaultResult<Document> {
        self.documents.delete(document_id, requester).await
    }

    /// Re-run the ingestion pipeline for one document.
    pub async fn reindex(&self, document_id: &str, requester: &Identity) -> VaultResult<usize> {
        self.pipeline.process(document_id, requester).await
    }

    /// Retry every un-indexed document the requester owns.
    pub async fn reindex_pending(&self, requester: &Identity) -> VaultResult<Vec<(Document, VaultResult<usize>)>> {
        let pending = self.documents.pending(Some(&requester.user_id)).await?;
        let mut results = Vec::with_capacity(pending.len());
        for doc in pending {
            let outcome = self.pipeline.process(&doc.id, requester).await;
            results.push((doc, outcome));
        }
        info!(user_id = %requester.user_id, documents = results.len(), "Reindexed pending documents");
        Ok(results)
    }

    pub async fn ask(&self, question: &str, requester: &Identity) -> VaultResult<QueryAnswer> {
        self.queries.query(question, requester).await
    }

    pub async fn analyze(&self, document_id: &str, requester: &Identity) -> VaultResult<String> {
        self.queries.analyze(document_id, requester).await
    }

    /// Audit entries visible to `requester`.
    pub async fn audit_entries(
        &self,
        requester: &Identity,
        limit: usize,
        descending: bool,
    ) -> VaultResult<Vec<AuditEntry>> {
        self.audit.visible_to(requester, limit, descending).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}
