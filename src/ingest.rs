//! Ingestion pipeline: extract → chunk → embed → index.
//!
//! Runs against a document already stored by [`DocumentStore::ingest`].
//! The plaintext is decrypted transiently for extraction. Nothing is
//! written to the index until every embedding call has succeeded, and the
//! final commit happens under the document's shared lock after checking
//! the document still exists, so a concurrent delete always wins.
//!
//! Each run that gets past authorization leaves an `INDEX` audit entry
//! with its outcome.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};
use zeroize::Zeroizing;

use lexvault_core::chunk::chunk_text;
use lexvault_core::embedding::Embedder;
use lexvault_core::index::SemanticIndex;
use lexvault_core::models::{ActionKind, Document, Identity};

use crate::audit::AuditLog;
use crate::config::{ChunkingConfig, Config, EmbeddingConfig};
use crate::documents::DocumentStore;
use crate::embedding::embed_with_retry;
use crate::error::{VaultError, VaultResult};
use crate::extract::TextExtractor;

pub struct IngestionPipeline {
    documents: Arc<DocumentStore>,
    index: Arc<dyn SemanticIndex>,
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    audit: Arc<AuditLog>,
    chunking: ChunkingConfig,
    embedding: EmbeddingConfig,
}

impl IngestionPipeline {
    pub fn new(
        documents: Arc<DocumentStore>,
        index: Arc<dyn SemanticIndex>,
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        audit: Arc<AuditLog>,
        config: &Config,
    ) -> Self {
        Self {
            documents,
            index,
            extractor,
            embedder,
            audit,
            chunking: config.chunking.clone(),
            embedding: config.embedding.clone(),
        }
    }

    /// Index one document, replacing any chunks it already had. Returns the
    /// number of chunks committed.
    pub async fn process(&self, document_id: &str, requester: &Identity) -> VaultResult<usize> {
        let (doc, plaintext) = self.documents.fetch(document_id, requester).await?;

        let outcome = self.index_document(&doc, plaintext, requester).await;
        let details = match &outcome {
            Ok(chunks) => json!({
                "document_id": doc.id,
                "filename": doc.filename,
                "status": "indexed",
                "chunks": chunks,
            }),
            Err(e) => json!({
                "document_id": doc.id,
                "filename": doc.filename,
                "status": "failed",
                "reason": e.public_message(),
            }),
        };
        self.audit
            .record(&requester.user_id, ActionKind::Index, details)
            .await;
        outcome
    }

    async fn index_document(
        &self,
        doc: &Document,
        plaintext: Zeroizing<Vec<u8>>,
        requester: &Identity,
    ) -> VaultResult<usize> {
        let document_id = doc.id.as_str();
        let extractor = self.extractor.clone();
        let filename = doc.filename.clone();
        let text = tokio::task::spawn_blocking(move || {
            extractor
                .extract(&filename, &plaintext)
                .map(Zeroizing::new)
        })
        .await
        .map_err(|e| VaultError::Extraction(e.to_string()))?
        .map_err(|e| {
            warn!(document_id, error = %e, "Text extraction failed");
            VaultError::Extraction(e.to_string())
        })?;

        let chunks = chunk_text(
            doc,
            &text,
            self.chunking.chunk_size,
            self.chunking.chunk_overlap,
        );
        drop(text);

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = embed_with_retry(self.embedder.as_ref(), &self.embedding, &texts)
            .await
            .map_err(|e| {
                warn!(document_id, error = %e, "Embedding failed; document left un-indexed");
                VaultError::Embedding(e.to_string())
            })?;

        let _guard = self.documents.read_lock(document_id).await;
        if self.documents.get(document_id).await?.is_none() {
            info!(document_id, "Document deleted during ingestion; discarding chunks");
            return Err(VaultError::not_found("document", document_id));
        }

        self.index
            .upsert_chunks(document_id, &chunks, &vectors)
            .await
            .map_err(|e| VaultError::IndexUnavailable(e.to_string()))?;
        self.documents.mark_indexed(document_id).await?;

        info!(
            document_id,
            user_id = %requester.user_id,
            chunks = chunks.len(),
            model = self.embedder.model_name(),
            "Indexed document"
        );
        Ok(chunks.len())
    }
}
