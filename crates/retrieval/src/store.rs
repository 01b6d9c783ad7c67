//! Query-time data access
//!
//! The orchestrator and answer service read chunks, cross-references, and
//! definitions through this trait so tests can substitute an in-memory
//! store. The production implementation delegates to the shared
//! repository.

use async_trait::async_trait;
use clausetrace_common::db::models::{Chunk, CrossReference, Definition};
use clausetrace_common::db::{NewCitation, Repository};
use clausetrace_common::errors::Result;
use uuid::Uuid;

/// Read-side store used during retrieval, plus citation persistence
#[async_trait]
pub trait RetrievalStore: Send + Sync {
    async fn chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>>;

    async fn cross_references_by_source_chunks(
        &self,
        source_chunk_ids: &[Uuid],
    ) -> Result<Vec<CrossReference>>;

    async fn definitions_by_documents(&self, document_ids: &[Uuid]) -> Result<Vec<Definition>>;

    async fn save_citations(&self, answer_id: Uuid, citations: Vec<NewCitation>) -> Result<()>;
}

#[async_trait]
impl RetrievalStore for Repository {
    async fn chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        Repository::chunks_by_ids(self, ids).await
    }

    async fn cross_references_by_source_chunks(
        &self,
        source_chunk_ids: &[Uuid],
    ) -> Result<Vec<CrossReference>> {
        Repository::cross_references_by_source_chunks(self, source_chunk_ids).await
    }

    async fn definitions_by_documents(&self, document_ids: &[Uuid]) -> Result<Vec<Definition>> {
        Repository::definitions_by_documents(self, document_ids).await
    }

    async fn save_citations(&self, answer_id: Uuid, citations: Vec<NewCitation>) -> Result<()> {
        Repository::save_citations(self, answer_id, citations).await
    }
}
