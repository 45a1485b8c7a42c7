//! SQLite-backed [`SemanticIndex`] implementation.
//!
//! Chunks and their vectors share one `chunks` table. Search is a brute
//! force cosine scan over the rows the scope admits, which is adequate at
//! vault scale and keeps the index in the same file as the metadata.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};

use lexvault_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use lexvault_core::index::{rank_hits, validate_upsert, ChunkHit, RetrievalScope, SemanticIndex};
use lexvault_core::models::Chunk;

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SemanticIndex for SqliteIndex {
    async fn upsert_chunks(&self, doc_id: &str, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<()> {
        validate_upsert(doc_id, chunks, vectors)?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await?;

        for (chunk, vector) in chunks.iter().zip(vectors) {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, chunk_index, owner_id, filename,
                                    text, hash, dims, embedding)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(chunk.key())
            .bind(&chunk.document_id)
            .bind(chunk.sequence_index)
            .bind(&chunk.owner_id)
            .bind(&chunk.filename)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .bind(vector.len() as i64)
            .bind(vec_to_blob(vector))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn search(&self, query_vec: &[f32], limit: usize, scope: &RetrievalScope) -> Result<Vec<ChunkHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let rows = match scope {
            RetrievalScope::Owner(owner_id) => {
                sqlx::query(
                    r#"
                    SELECT document_id, chunk_index, owner_id, filename, text, embedding
                    FROM chunks
                    WHERE owner_id = ? AND dims = ?
                    "#,
                )
                .bind(owner_id)
                .bind(query_vec.len() as i64)
                .fetch_all(&self.pool)
                .await?
            }
            RetrievalScope::Shared => {
                sqlx::query(
                    r#"
                    SELECT document_id, chunk_index, owner_id, filename, text, embedding
                    FROM chunks
                    WHERE dims = ?
                    "#,
                )
                .bind(query_vec.len() as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let hits: Vec<ChunkHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                ChunkHit {
                    document_id: row.get("document_id"),
                    sequence_index: row.get("chunk_index"),
                    filename: row.get("filename"),
                    owner_id: row.get("owner_id"),
                    text: row.get("text"),
                    score: cosine_similarity(query_vec, &blob_to_vec(&blob)),
                }
            })
            .filter(|hit| scope.admits(&hit.owner_id))
            .collect();

        Ok(rank_hits(hits, limit))
    }

    async fn evict_document(&self, doc_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn count_for_document(&self, doc_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }
}
