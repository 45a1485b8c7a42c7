//! Retrieval-augmented question answering and contract risk analysis.
//!
//! A question is embedded, matched against the requester's own chunks
//! (unless the deployment runs in shared-corpus mode), packed into a
//! bounded context, and answered by the configured [`AnswerModel`]. Every
//! question and analysis is audited, including ones that found nothing.

use std::sync::Arc;

use serde_json::json;
use tracing::{info, warn};

use lexvault_core::answer::{assemble_context, truncate_to_budget, AnswerModel, NO_CONTEXT_ANSWER};
use lexvault_core::embedding::Embedder;
use lexvault_core::index::{RetrievalScope, SemanticIndex};
use lexvault_core::models::{ActionKind, Identity, QueryAnswer, QueryDetails};

use crate::audit::AuditLog;
use crate::config::{Config, EmbeddingConfig, LlmConfig, RetrievalConfig};
use crate::documents::DocumentStore;
use crate::embedding::embed_query;
use crate::error::{VaultError, VaultResult};
use crate::extract::TextExtractor;
use crate::llm::{analyze_with_retry, answer_with_retry};

pub struct QueryEngine {
    index: Arc<dyn SemanticIndex>,
    embedder: Arc<dyn Embedder>,
    model: Arc<dyn AnswerModel>,
    audit: Arc<AuditLog>,
    documents: Arc<DocumentStore>,
    extractor: Arc<dyn TextExtractor>,
    retrieval: RetrievalConfig,
    embedding: EmbeddingConfig,
    llm: LlmConfig,
}

impl QueryEngine {
    pub fn new(
        index: Arc<dyn SemanticIndex>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn AnswerModel>,
        audit: Arc<AuditLog>,
        documents: Arc<DocumentStore>,
        extractor: Arc<dyn TextExtractor>,
        config: &Config,
    ) -> Self {
        if config.retrieval.shared_corpus {
            warn!("retrieval.shared_corpus is enabled: questions may be answered from other users' documents");
        }
        Self {
            index,
            embedder,
            model,
            audit,
            documents,
            extractor,
            retrieval: config.retrieval.clone(),
            embedding: config.embedding.clone(),
            llm: config.llm.clone(),
        }
    }

    pub async fn query(&self, question: &str, requester: &Identity) -> VaultResult<QueryAnswer> {
        let question = question.trim();
        if question.is_empty() {
            return Err(VaultError::InvalidInput("Question must not be empty".into()));
        }

        let query_vec = embed_query(self.embedder.as_ref(), &self.embedding, question)
            .await
            .map_err(|e| VaultError::Embedding(e.to_string()))?;

        let scope = if self.retrieval.shared_corpus {
            RetrievalScope::Shared
        } else {
            RetrievalScope::Owner(requester.user_id.clone())
        };

        let hits = self
            .index
            .search(&query_vec, self.retrieval.top_k, &scope)
            .await
            .map_err(|e| {
                warn!(user_id = %requester.user_id, error = %e, "Semantic index search failed");
                VaultError::IndexUnavailable(e.to_string())
            })?;

        let hits: Vec<_> = hits
            .into_iter()
            .filter(|h| h.score > self.retrieval.min_score)
            .collect();
        let window = assemble_context(&hits, self.retrieval.context_budget_bytes);

        let answer = if window.is_empty() {
            QueryAnswer {
                answer: NO_CONTEXT_ANSWER.to_string(),
                sources: Default::default(),
            }
        } else {
            let text = answer_with_retry(self.model.as_ref(), &self.llm, &window.text, question)
                .await
                .map_err(|e| VaultError::Synthesis(e.to_string()))?;
            QueryAnswer {
                answer: text,
                sources: window.sources(),
            }
        };

        info!(
            user_id = %requester.user_id,
            chunks = window.used.len(),
            dropped = window.dropped,
            sources = answer.sources.len(),
            "Answered question"
        );

        let details = QueryDetails {
            prompt: question.to_string(),
            response: answer.answer.clone(),
            refs: answer.sources.clone(),
        };
        self.audit
            .record(
                &requester.user_id,
                ActionKind::Query,
                serde_json::to_value(&details).unwrap_or_else(|_| json!({})),
            )
            .await;

        Ok(answer)
    }

    /// Ask the answer model for potential risks in one of the requester's
    /// documents.
    pub async fn analyze(&self, document_id: &str, requester: &Identity) -> VaultResult<String> {
        let (doc, plaintext) = self.documents.fetch(document_id, requester).await?;

        let extractor = self.extractor.clone();
        let filename = doc.filename.clone();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&filename, &plaintext))
            .await
            .map_err(|e| VaultError::Extraction(e.to_string()))?
            .map_err(|e| VaultError::Extraction(e.to_string()))?;

        let clause = truncate_to_budget(&text, self.retrieval.context_budget_bytes);
        let analysis = analyze_with_retry(self.model.as_ref(), &self.llm, clause)
            .await
            .map_err(|e| VaultError::Synthesis(e.to_string()))?;

        self.audit
            .record(
                &requester.user_id,
                ActionKind::Analyze,
                json!({
                    "document_id": doc.id,
                    "filename": doc.filename,
                    "response": analysis,
                }),
            )
            .await;

        Ok(analysis)
    }
}
