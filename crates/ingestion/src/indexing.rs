//! Embedding and indexing gateway
//!
//! Writes finished chunks to the two retrieval indexes: embeddings to the
//! vector store and section-prefixed text to the keyword index. Index
//! writes retry with exponential backoff a bounded number of times;
//! exhausting retries fails the document's indexing stage.

use backoff::ExponentialBackoff;
use clausetrace_common::embeddings::Embedder;
use clausetrace_common::errors::{AppError, Result};
use clausetrace_common::index::{SearchIndex, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// A chunk ready for index writes
#[derive(Debug, Clone)]
pub struct IndexableChunk {
    pub id: Uuid,

    /// Section-prefixed text, what both indexes see
    pub display_text: String,
}

/// Gateway over the embedding provider and both indexes
pub struct IndexingGateway {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    search_index: Arc<dyn SearchIndex>,
    batch_size: usize,
    max_retry_elapsed: Duration,
}

impl IndexingGateway {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        search_index: Arc<dyn SearchIndex>,
        batch_size: usize,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            search_index,
            batch_size: batch_size.max(1),
            max_retry_elapsed: Duration::from_secs(30),
        }
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: Duration::from_millis(200),
            max_elapsed_time: Some(self.max_retry_elapsed),
            ..ExponentialBackoff::default()
        }
    }

    /// Embed and index all chunks of a document
    #[instrument(skip(self, chunks), fields(chunk_count = chunks.len()))]
    pub async fn index_chunks(&self, chunks: &[IndexableChunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let model = self.embedder.model_name().to_string();

        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.display_text.clone()).collect();

            let started = std::time::Instant::now();
            let embeddings = self.embedder.embed_batch(&texts).await;
            clausetrace_common::metrics::record_embedding(
                started.elapsed().as_secs_f64(),
                &model,
                embeddings.is_ok(),
            );
            let embeddings = embeddings?;

            if embeddings.len() != batch.len() {
                return Err(AppError::EmbeddingError {
                    message: format!(
                        "Expected {} embeddings, got {}",
                        batch.len(),
                        embeddings.len()
                    ),
                });
            }

            for (chunk, embedding) in batch.iter().zip(embeddings.iter()) {
                self.write_vector(chunk.id, embedding, &model).await?;
                self.write_keyword(chunk.id, &chunk.display_text).await?;
            }

            debug!(batch_size = batch.len(), "Index batch written");
        }

        info!(chunk_count = chunks.len(), "All chunks indexed");
        Ok(())
    }

    async fn write_vector(&self, chunk_id: Uuid, embedding: &[f32], model: &str) -> Result<()> {
        backoff::future::retry(self.retry_policy(), || async {
            self.vector_store
                .upsert(chunk_id, embedding, model)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
        .map_err(|e| AppError::IndexWriteFailed {
            stage: "vector".to_string(),
            message: format!("Retries exhausted for chunk {}: {}", chunk_id, e),
        })
    }

    async fn write_keyword(&self, chunk_id: Uuid, text: &str) -> Result<()> {
        backoff::future::retry(self.retry_policy(), || async {
            self.search_index
                .index(chunk_id, text)
                .await
                .map_err(backoff::Error::transient)
        })
        .await
        .map_err(|e| AppError::IndexWriteFailed {
            stage: "keyword".to_string(),
            message: format!("Retries exhausted for chunk {}: {}", chunk_id, e),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clausetrace_common::index::SearchHit;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeEmbedder;

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![0.1, 0.2])
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|_| vec![0.1, 0.2]).collect())
        }
        fn model_name(&self) -> &str {
            "fake"
        }
        fn dimension(&self) -> usize {
            2
        }
    }

    #[derive(Default)]
    struct RecordingStore {
        upserts: Mutex<Vec<Uuid>>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl VectorStore for RecordingStore {
        async fn upsert(&self, chunk_id: Uuid, _embedding: &[f32], _model: &str) -> Result<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::IndexWriteFailed {
                    stage: "vector".to_string(),
                    message: "transient".to_string(),
                });
            }
            self.upserts.lock().unwrap().push(chunk_id);
            Ok(())
        }
        async fn query(
            &self,
            _embedding: &[f32],
            _document_ids: &[Uuid],
            _top_k: usize,
        ) -> Result<Vec<SearchHit>> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingIndex {
        indexed: Mutex<Vec<(Uuid, String)>>,
    }

    #[async_trait]
    impl SearchIndex for RecordingIndex {
        async fn index(&self, chunk_id: Uuid, text: &str) -> Result<()> {
            self.indexed.lock().unwrap().push((chunk_id, text.to_string()));
            Ok(())
        }
        async fn search(
            &self,
            _query: &str,
            _document_ids: &[Uuid],
            _top_k: usize,
        ) -> Result<Vec<SearchHit>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_indexes_every_chunk_in_both_indexes() {
        let store = Arc::new(RecordingStore::default());
        let index = Arc::new(RecordingIndex::default());
        let gateway = IndexingGateway::new(
            Arc::new(FakeEmbedder),
            store.clone(),
            index.clone(),
            2,
        );

        let chunks: Vec<IndexableChunk> = (0..3)
            .map(|i| IndexableChunk {
                id: Uuid::new_v4(),
                display_text: format!("[Section {}] body", i),
            })
            .collect();

        gateway.index_chunks(&chunks).await.unwrap();

        assert_eq!(store.upserts.lock().unwrap().len(), 3);
        let indexed = index.indexed.lock().unwrap();
        assert_eq!(indexed.len(), 3);
        assert!(indexed[0].1.starts_with("[Section"));
    }

    #[tokio::test]
    async fn test_transient_vector_failure_is_retried() {
        let store = Arc::new(RecordingStore {
            failures_left: AtomicUsize::new(1),
            ..Default::default()
        });
        let index = Arc::new(RecordingIndex::default());
        let gateway = IndexingGateway::new(
            Arc::new(FakeEmbedder),
            store.clone(),
            index,
            8,
        );

        let chunks = vec![IndexableChunk {
            id: Uuid::new_v4(),
            display_text: "text".to_string(),
        }];

        gateway.index_chunks(&chunks).await.unwrap();
        assert_eq!(store.upserts.lock().unwrap().len(), 1);
    }
}
