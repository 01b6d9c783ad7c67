//! Repository pattern for database operations
//!
//! Provides a clean interface for all data access operations with proper
//! error handling. The ingestion job is the single writer of document
//! status; every status write goes through the transition function.

use crate::db::models::*;
use crate::db::DbPool;
use crate::errors::{AppError, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use uuid::Uuid;

/// Section data produced by the structure parser
#[derive(Debug, Clone)]
pub struct NewSection {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    pub label: String,
    pub title: String,
    pub depth: i32,
    pub char_start: i32,
    pub char_end: i32,
}

/// Chunk data produced by the legal chunker
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub id: Uuid,
    pub section_id: Uuid,
    pub section_path: String,
    pub chunk_index: i32,
    pub content: String,
    pub token_count: i32,
    pub char_start: i32,
    pub char_end: i32,
    pub overlap_tokens_start: i32,
    pub overlap_tokens_end: i32,
}

/// Definition data produced by the definition extractor
#[derive(Debug, Clone)]
pub struct NewDefinition {
    pub id: Uuid,
    pub term_display: String,
    pub term_key: String,
    pub definition_text: String,
    pub defining_chunk_id: Option<Uuid>,
    pub scope_section_path: Option<String>,
    pub char_start: i32,
    pub ambiguous: bool,
}

/// Cross-reference data produced by the cross-reference extractor
#[derive(Debug, Clone)]
pub struct NewCrossReference {
    pub id: Uuid,
    pub source_chunk_id: Uuid,
    pub target_label: String,
    pub resolved_chunk_ids: Option<Vec<Uuid>>,
    pub kind: ReferenceKind,
}

/// Citation data produced by the citation tracker
#[derive(Debug, Clone)]
pub struct NewCitation {
    pub marker_index: i32,
    pub chunk_id: Option<Uuid>,
    pub answer_span_start: i32,
    pub answer_span_end: i32,
    pub resolved: bool,
}

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Document Operations
    // ========================================================================

    /// Create a new document in `pending` status
    pub async fn create_document(
        &self,
        thread_id: Uuid,
        user_id: String,
        filename: String,
        extracted_text: Option<String>,
    ) -> Result<Document> {
        let now = chrono::Utc::now();

        let document = DocumentActiveModel {
            id: Set(Uuid::new_v4()),
            thread_id: Set(thread_id),
            user_id: Set(user_id),
            filename: Set(filename),
            content_hash: Set(None),
            extracted_text: Set(extracted_text),
            status: Set(ProcessingStatus::Pending.into()),
            error_message: Set(None),
            failed_stage: Set(None),
            chunk_count: Set(0),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        document.insert(self.write_conn()).await.map_err(Into::into)
    }

    /// Find document by ID
    pub async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Advance a document's processing status
    ///
    /// Rejects invalid transitions. `error_message` and `failed_stage` are
    /// only written on transition to `failed`.
    pub async fn transition_document_status(
        &self,
        id: Uuid,
        to: ProcessingStatus,
        error_message: Option<String>,
        failed_stage: Option<String>,
    ) -> Result<Document> {
        let document = self
            .find_document_by_id(id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        let from = document.processing_status();
        from.transition(to)
            .map_err(|(from, to)| AppError::InvalidStatusTransition { from, to })?;

        let mut active: DocumentActiveModel = document.into();
        active.status = Set(to.into());
        active.updated_at = Set(chrono::Utc::now().into());
        if to == ProcessingStatus::Failed {
            active.error_message = Set(error_message);
            active.failed_stage = Set(failed_stage);
        }

        active.update(self.write_conn()).await.map_err(Into::into)
    }

    /// Record the content hash and chunk count once chunking is done
    pub async fn set_document_chunking_result(
        &self,
        id: Uuid,
        content_hash: String,
        chunk_count: i32,
    ) -> Result<()> {
        let document = self
            .find_document_by_id(id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound { id: id.to_string() })?;

        let mut active: DocumentActiveModel = document.into();
        active.content_hash = Set(Some(content_hash));
        active.chunk_count = Set(chunk_count);
        active.updated_at = Set(chrono::Utc::now().into());
        active.update(self.write_conn()).await?;
        Ok(())
    }

    /// Remove all derived rows for a document before re-chunking
    ///
    /// A recovered run re-derives sections, chunks, definitions, and
    /// cross-references from scratch; rows from the aborted attempt must
    /// not survive alongside the new set.
    pub async fn clear_document_artifacts(&self, document_id: Uuid) -> Result<()> {
        CrossReferenceEntity::delete_many()
            .filter(CrossReferenceColumn::DocumentId.eq(document_id))
            .exec(self.write_conn())
            .await?;
        DefinitionEntity::delete_many()
            .filter(DefinitionColumn::DocumentId.eq(document_id))
            .exec(self.write_conn())
            .await?;
        ChunkEntity::delete_many()
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .exec(self.write_conn())
            .await?;
        SectionEntity::delete_many()
            .filter(SectionColumn::DocumentId.eq(document_id))
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Delete a document; owned rows cascade
    pub async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let result = DocumentEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;
        Ok(result.rows_affected > 0)
    }

    // ========================================================================
    // Section Operations
    // ========================================================================

    /// Insert the section tree for a document
    pub async fn insert_sections(&self, document_id: Uuid, sections: Vec<NewSection>) -> Result<()> {
        if sections.is_empty() {
            return Ok(());
        }

        let models: Vec<SectionActiveModel> = sections
            .into_iter()
            .map(|s| SectionActiveModel {
                id: Set(s.id),
                document_id: Set(document_id),
                parent_id: Set(s.parent_id),
                label: Set(s.label),
                title: Set(s.title),
                depth: Set(s.depth),
                char_start: Set(s.char_start),
                char_end: Set(s.char_end),
            })
            .collect();

        SectionEntity::insert_many(models)
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Get sections for a document, root first
    pub async fn sections_by_document(&self, document_id: Uuid) -> Result<Vec<Section>> {
        SectionEntity::find()
            .filter(SectionColumn::DocumentId.eq(document_id))
            .order_by_asc(SectionColumn::CharStart)
            .order_by_asc(SectionColumn::Depth)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Chunk Operations
    // ========================================================================

    /// Insert chunks for a document (embeddings written later by the
    /// vector store client)
    pub async fn insert_chunks(&self, document_id: Uuid, chunks: Vec<NewChunk>) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now();
        let models: Vec<ChunkActiveModel> = chunks
            .into_iter()
            .map(|c| ChunkActiveModel {
                id: Set(c.id),
                document_id: Set(document_id),
                section_id: Set(c.section_id),
                section_path: Set(c.section_path),
                chunk_index: Set(c.chunk_index),
                content: Set(c.content),
                token_count: Set(c.token_count),
                char_start: Set(c.char_start),
                char_end: Set(c.char_end),
                overlap_tokens_start: Set(c.overlap_tokens_start),
                overlap_tokens_end: Set(c.overlap_tokens_end),
                embedding: Set(None),
                embedding_model: Set(None),
                search_text: Set(None),
                created_at: Set(now.into()),
            })
            .collect();

        ChunkEntity::insert_many(models)
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Get chunks for a document in source order
    pub async fn chunks_by_document(&self, document_id: Uuid) -> Result<Vec<Chunk>> {
        ChunkEntity::find()
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .order_by_asc(ChunkColumn::ChunkIndex)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Fetch chunks by id; missing ids are skipped
    pub async fn chunks_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Chunk>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        ChunkEntity::find()
            .filter(ChunkColumn::Id.is_in(ids.to_vec()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Count chunks for a document
    pub async fn count_chunks(&self, document_id: Uuid) -> Result<u64> {
        ChunkEntity::find()
            .filter(ChunkColumn::DocumentId.eq(document_id))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Definition Operations
    // ========================================================================

    /// Insert the definition catalog for a document
    pub async fn insert_definitions(
        &self,
        document_id: Uuid,
        definitions: Vec<NewDefinition>,
    ) -> Result<()> {
        if definitions.is_empty() {
            return Ok(());
        }

        let models: Vec<DefinitionActiveModel> = definitions
            .into_iter()
            .map(|d| DefinitionActiveModel {
                id: Set(d.id),
                document_id: Set(document_id),
                term_display: Set(d.term_display),
                term_key: Set(d.term_key),
                definition_text: Set(d.definition_text),
                defining_chunk_id: Set(d.defining_chunk_id),
                scope_section_path: Set(d.scope_section_path),
                char_start: Set(d.char_start),
                ambiguous: Set(d.ambiguous),
            })
            .collect();

        DefinitionEntity::insert_many(models)
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Get the definition catalog across a set of documents
    pub async fn definitions_by_documents(&self, document_ids: &[Uuid]) -> Result<Vec<Definition>> {
        if document_ids.is_empty() {
            return Ok(vec![]);
        }

        DefinitionEntity::find()
            .filter(DefinitionColumn::DocumentId.is_in(document_ids.to_vec()))
            .order_by_asc(DefinitionColumn::CharStart)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Cross-Reference Operations
    // ========================================================================

    /// Insert cross-references for a document
    pub async fn insert_cross_references(
        &self,
        document_id: Uuid,
        references: Vec<NewCrossReference>,
    ) -> Result<()> {
        if references.is_empty() {
            return Ok(());
        }

        let models: Vec<CrossReferenceActiveModel> = references
            .into_iter()
            .map(|r| CrossReferenceActiveModel {
                id: Set(r.id),
                document_id: Set(document_id),
                source_chunk_id: Set(r.source_chunk_id),
                target_label: Set(r.target_label),
                resolved_chunk_ids: Set(r
                    .resolved_chunk_ids
                    .map(|ids| serde_json::json!(ids))),
                kind: Set(r.kind.into()),
            })
            .collect();

        CrossReferenceEntity::insert_many(models)
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Write the resolved target set for a cross-reference
    ///
    /// Resolution is idempotent; re-running overwrites with the same set.
    /// A dangling reference is stored as an empty array, not null.
    pub async fn set_cross_reference_targets(
        &self,
        reference_id: Uuid,
        target_chunk_ids: Vec<Uuid>,
    ) -> Result<()> {
        let reference = CrossReferenceEntity::find_by_id(reference_id)
            .one(self.read_conn())
            .await?
            .ok_or_else(|| AppError::NotFound {
                resource_type: "cross_reference".to_string(),
                id: reference_id.to_string(),
            })?;

        let mut active: CrossReferenceActiveModel = reference.into();
        active.resolved_chunk_ids = Set(Some(serde_json::json!(target_chunk_ids)));
        active.update(self.write_conn()).await?;
        Ok(())
    }

    /// Cross-references for a document, all kinds
    pub async fn cross_references_by_document(
        &self,
        document_id: Uuid,
    ) -> Result<Vec<CrossReference>> {
        CrossReferenceEntity::find()
            .filter(CrossReferenceColumn::DocumentId.eq(document_id))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    /// Outgoing cross-references from a set of source chunks
    pub async fn cross_references_by_source_chunks(
        &self,
        source_chunk_ids: &[Uuid],
    ) -> Result<Vec<CrossReference>> {
        if source_chunk_ids.is_empty() {
            return Ok(vec![]);
        }

        CrossReferenceEntity::find()
            .filter(CrossReferenceColumn::SourceChunkId.is_in(source_chunk_ids.to_vec()))
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Citation Operations
    // ========================================================================

    /// Persist the final citation set for an answer
    pub async fn save_citations(&self, answer_id: Uuid, citations: Vec<NewCitation>) -> Result<()> {
        if citations.is_empty() {
            return Ok(());
        }

        let now = chrono::Utc::now();
        let models: Vec<CitationActiveModel> = citations
            .into_iter()
            .map(|c| CitationActiveModel {
                id: Set(Uuid::new_v4()),
                answer_id: Set(answer_id),
                marker_index: Set(c.marker_index),
                chunk_id: Set(c.chunk_id),
                answer_span_start: Set(c.answer_span_start),
                answer_span_end: Set(c.answer_span_end),
                resolved: Set(c.resolved),
                created_at: Set(now.into()),
            })
            .collect();

        CitationEntity::insert_many(models)
            .exec(self.write_conn())
            .await?;
        Ok(())
    }

    /// Look up the stored citations for an answer
    pub async fn citations_by_answer(&self, answer_id: Uuid) -> Result<Vec<Citation>> {
        CitationEntity::find()
            .filter(CitationColumn::AnswerId.eq(answer_id))
            .order_by_asc(CitationColumn::MarkerIndex)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
