//! Vector store and keyword index clients
//!
//! Both indexes live in Postgres: embeddings in a pgvector column on the
//! chunks table, keyword search over a tsvector of the section-prefixed
//! chunk text. The traits keep the retrieval orchestrator independent of
//! the backing store so it can run against in-memory fakes in tests.

use crate::db::DbPool;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DbBackend, Statement};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// A scored hit from one retrieval signal
///
/// Scores are comparable within a signal, not across signals; fusion
/// normalizes before combining.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub chunk_id: Uuid,
    pub score: f32,

    /// Matched fragments from the keyword signal; empty for vector hits
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
}

impl SearchHit {
    pub fn new(chunk_id: Uuid, score: f32) -> Self {
        Self {
            chunk_id,
            score,
            highlights: Vec::new(),
        }
    }
}

/// Write and query the semantic (vector) index
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a chunk's embedding; overwrites any previous vector
    async fn upsert(&self, chunk_id: Uuid, embedding: &[f32], model: &str) -> Result<()>;

    /// Top-K chunks by cosine similarity, scoped to the given documents
    async fn query(
        &self,
        embedding: &[f32],
        document_ids: &[Uuid],
        top_k: usize,
    ) -> Result<Vec<SearchHit>>;
}

/// Write and query the keyword (full-text) index
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Index a chunk's searchable text; overwrites any previous entry
    async fn index(&self, chunk_id: Uuid, text: &str) -> Result<()>;

    /// Top-K chunks by keyword relevance, scoped to the given documents
    async fn search(
        &self,
        query: &str,
        document_ids: &[Uuid],
        top_k: usize,
    ) -> Result<Vec<SearchHit>>;
}

fn format_pgvector(embedding: &[f32]) -> String {
    format!(
        "[{}]",
        embedding
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(",")
    )
}

/// pgvector-backed vector store over the chunks table
pub struct PgVectorStore {
    db: Arc<DbPool>,
}

impl PgVectorStore {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl VectorStore for PgVectorStore {
    async fn upsert(&self, chunk_id: Uuid, embedding: &[f32], model: &str) -> Result<()> {
        let embedding_str = format_pgvector(embedding);

        let sql = format!(
            "UPDATE chunks SET embedding = '{}'::vector, embedding_model = $2 WHERE id = $1",
            embedding_str
        );

        let result = self
            .db
            .write()
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![chunk_id.into(), model.into()],
            ))
            .await
            .map_err(|e| AppError::IndexWriteFailed {
                stage: "vector".to_string(),
                message: format!("Embedding upsert failed: {}", e),
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::ChunkNotFound {
                id: chunk_id.to_string(),
            });
        }

        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        document_ids: &[Uuid],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        if document_ids.is_empty() {
            return Ok(vec![]);
        }

        let embedding_str = format_pgvector(embedding);

        let sql = format!(
            r#"
            SELECT
                c.id as chunk_id,
                1 - (c.embedding <=> '{embedding}'::vector) as score
            FROM chunks c
            WHERE c.document_id = ANY($1)
              AND c.embedding IS NOT NULL
            ORDER BY c.embedding <=> '{embedding}'::vector
            LIMIT $2
            "#,
            embedding = embedding_str
        );

        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                &sql,
                vec![document_ids.to_vec().into(), (top_k as i64).into()],
            ))
            .await?;

        let hits = rows
            .iter()
            .filter_map(|row| {
                use sea_orm::TryGetable;
                Some(SearchHit::new(
                    Uuid::try_get(row, "", "chunk_id").ok()?,
                    f64::try_get(row, "", "score").ok()? as f32,
                ))
            })
            .collect();

        Ok(hits)
    }
}

/// Postgres full-text search over the chunks table
pub struct PgSearchIndex {
    db: Arc<DbPool>,
}

impl PgSearchIndex {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SearchIndex for PgSearchIndex {
    async fn index(&self, chunk_id: Uuid, text: &str) -> Result<()> {
        let result = self
            .db
            .write()
            .execute(Statement::from_sql_and_values(
                DbBackend::Postgres,
                "UPDATE chunks SET search_text = $2 WHERE id = $1",
                vec![chunk_id.into(), text.into()],
            ))
            .await
            .map_err(|e| AppError::IndexWriteFailed {
                stage: "keyword".to_string(),
                message: format!("Search text write failed: {}", e),
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::ChunkNotFound {
                id: chunk_id.to_string(),
            });
        }

        Ok(())
    }

    async fn search(
        &self,
        query: &str,
        document_ids: &[Uuid],
        top_k: usize,
    ) -> Result<Vec<SearchHit>> {
        if document_ids.is_empty() || query.trim().is_empty() {
            return Ok(vec![]);
        }

        // ts_rank_cd with length normalization; raw scores can exceed 1
        let sql = r#"
            SELECT
                c.id as chunk_id,
                ts_rank_cd(
                    to_tsvector('english', c.search_text),
                    plainto_tsquery('english', $2),
                    32
                ) as score,
                ts_headline(
                    'english', c.search_text,
                    plainto_tsquery('english', $2),
                    'MaxFragments=2, MinWords=3, MaxWords=12'
                ) as highlight
            FROM chunks c
            WHERE c.document_id = ANY($1)
              AND c.search_text IS NOT NULL
              AND to_tsvector('english', c.search_text) @@ plainto_tsquery('english', $2)
            ORDER BY score DESC
            LIMIT $3
        "#;

        let rows = self
            .db
            .read()
            .query_all(Statement::from_sql_and_values(
                DbBackend::Postgres,
                sql,
                vec![
                    document_ids.to_vec().into(),
                    query.into(),
                    (top_k as i64).into(),
                ],
            ))
            .await?;

        let hits = rows
            .iter()
            .filter_map(|row| {
                use sea_orm::TryGetable;
                let raw = f64::try_get(row, "", "score").ok()?;
                let highlight = String::try_get(row, "", "highlight").ok();
                Some(SearchHit {
                    chunk_id: Uuid::try_get(row, "", "chunk_id").ok()?,
                    // squash into 0-1 so fusion sees a bounded range
                    score: (raw / (raw + 1.0)) as f32,
                    highlights: highlight.into_iter().filter(|h| !h.is_empty()).collect(),
                })
            })
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pgvector_format() {
        let embedding = vec![0.1, 0.2, 0.3];
        assert_eq!(format_pgvector(&embedding), "[0.1,0.2,0.3]");
    }

    #[test]
    fn test_keyword_score_squash_is_monotonic() {
        let squash = |raw: f64| (raw / (raw + 1.0)) as f32;
        assert!(squash(0.0) < squash(0.5));
        assert!(squash(0.5) < squash(4.0));
        assert!(squash(100.0) < 1.0);
    }
}
