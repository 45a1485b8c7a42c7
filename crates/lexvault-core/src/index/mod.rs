//! Semantic index abstraction for LexVault.
//!
//! The [`SemanticIndex`] trait is everything the ingestion and query
//! pipelines need from a vector store: replace a document's chunks,
//! nearest-neighbour search restricted to a [`RetrievalScope`], and
//! eviction by document id. Chunks are keyed by
//! `(document_id, sequence_index)`, so re-ingesting a document replaces
//! its previous chunks instead of duplicating them.
//!
//! Implementations must be `Send + Sync` and safe under concurrent
//! upserts of different documents.

pub mod memory;

pub use memory::InMemoryIndex;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Chunk;

/// Which chunks a search may return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalScope {
    /// Only chunks whose owner is this user id.
    Owner(String),
    /// Every chunk in the index, regardless of owner.
    Shared,
}

impl RetrievalScope {
    pub fn admits(&self, owner_id: &str) -> bool {
        match self {
            RetrievalScope::Owner(id) => id == owner_id,
            RetrievalScope::Shared => true,
        }
    }
}

/// A chunk returned from similarity search.
#[derive(Debug, Clone)]
pub struct ChunkHit {
    pub document_id: String,
    pub sequence_index: i64,
    pub filename: String,
    pub owner_id: String,
    pub text: String,
    /// Cosine similarity to the query vector.
    pub score: f32,
}

/// Abstract vector store keyed by document id.
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_chunks`](SemanticIndex::upsert_chunks) | Replace all chunks of a document |
/// | [`search`](SemanticIndex::search) | Top-K cosine similarity within a scope |
/// | [`evict_document`](SemanticIndex::evict_document) | Remove a document's chunks |
/// | [`count_for_document`](SemanticIndex::count_for_document) | Number of indexed chunks |
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    /// Replace every chunk of `doc_id` with `chunks`, pairing each with the
    /// vector at the same position. `chunks` and `vectors` must have equal
    /// length and every chunk must belong to `doc_id`.
    async fn upsert_chunks(&self, doc_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()>;

    /// Return up to `limit` chunks admitted by `scope`, best score first.
    async fn search(&self, query_vec: &[f32], limit: usize, scope: &RetrievalScope) -> Result<Vec<ChunkHit>>;

    /// Remove every chunk of `doc_id`. Returns how many were removed.
    async fn evict_document(&self, doc_id: &str) -> Result<u64>;

    /// Number of chunks currently indexed for `doc_id`.
    async fn count_for_document(&self, doc_id: &str) -> Result<u64>;
}

/// Check the shape of an upsert before touching any backend state.
pub fn validate_upsert(doc_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        anyhow::bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    if let Some(stray) = chunks.iter().find(|c| c.document_id != doc_id) {
        anyhow::bail!(
            "chunk {} does not belong to document {}",
            stray.key(),
            doc_id
        );
    }
    Ok(())
}

/// Order hits best-first and keep the top `limit`.
pub fn rank_hits(mut hits: Vec<ChunkHit>, limit: usize) -> Vec<ChunkHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
            .then_with(|| a.sequence_index.cmp(&b.sequence_index))
    });
    hits.truncate(limit);
    hits
}
