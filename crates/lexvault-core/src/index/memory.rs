//! In-memory [`SemanticIndex`] implementation for tests and ephemeral
//! deployments.
//!
//! Entries live in a `HashMap` keyed by document id behind a
//! `std::sync::RwLock`. Search is brute-force cosine similarity over all
//! admitted vectors.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::embedding::cosine_similarity;
use crate::models::Chunk;

use super::{rank_hits, validate_upsert, ChunkHit, RetrievalScope, SemanticIndex};

struct StoredChunk {
    chunk: Chunk,
    vector: Vec<f32>,
}

/// Volatile semantic index.
pub struct InMemoryIndex {
    docs: RwLock<HashMap<String, Vec<StoredChunk>>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Vec<StoredChunk>>>> {
        self.docs.read().map_err(|_| anyhow!("in-memory index lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Vec<StoredChunk>>>> {
        self.docs.write().map_err(|_| anyhow!("in-memory index lock poisoned"))
    }
}

impl Default for InMemoryIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemanticIndex for InMemoryIndex {
    async fn upsert_chunks(&self, doc_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        validate_upsert(doc_id, chunks, vectors)?;
        let stored: Vec<StoredChunk> = chunks
            .iter()
            .zip(vectors.iter())
            .map(|(c, v)| StoredChunk {
                chunk: c.clone(),
                vector: v.clone(),
            })
            .collect();
        let mut docs = self.write()?;
        if stored.is_empty() {
            docs.remove(doc_id);
        } else {
            docs.insert(doc_id.to_string(), stored);
        }
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], limit: usize, scope: &RetrievalScope) -> Result<Vec<ChunkHit>> {
        let docs = self.read()?;
        let hits: Vec<ChunkHit> = docs
            .values()
            .flatten()
            .filter(|sc| scope.admits(&sc.chunk.owner_id))
            .map(|sc| ChunkHit {
                document_id: sc.chunk.document_id.clone(),
                sequence_index: sc.chunk.sequence_index,
                filename: sc.chunk.filename.clone(),
                owner_id: sc.chunk.owner_id.clone(),
                text: sc.chunk.text.clone(),
                score: cosine_similarity(query_vec, &sc.vector),
            })
            .collect();
        Ok(rank_hits(hits, limit))
    }

    async fn evict_document(&self, doc_id: &str) -> Result<u64> {
        let mut docs = self.write()?;
        Ok(docs.remove(doc_id).map(|v| v.len() as u64).unwrap_or(0))
    }

    async fn count_for_document(&self, doc_id: &str) -> Result<u64> {
        let docs = self.read()?;
        Ok(docs.get(doc_id).map(|v| v.len() as u64).unwrap_or(0))
    }
}
