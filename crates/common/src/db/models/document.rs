//! Document entity with processing lifecycle

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Document processing lifecycle
///
/// Status writes go through [`ProcessingStatus::transition`]; the ingestion
/// job for a document is the single writer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    Pending,
    Extracting,
    Chunking,
    Indexing,
    Ready,
    Failed,
}

impl ProcessingStatus {
    /// Validate a status transition, returning the new status
    ///
    /// Forward-only: each stage may advance to the next stage or to `Failed`.
    /// `Ready` and `Failed` are terminal. An abandoned run stranded at a
    /// mid-pipeline stage may rewind to `Pending` for a restart.
    pub fn transition(self, to: ProcessingStatus) -> Result<ProcessingStatus, (String, String)> {
        use ProcessingStatus::*;

        let ok = match (self, to) {
            (Pending, Extracting) => true,
            (Extracting, Chunking) => true,
            (Chunking, Indexing) => true,
            (Indexing, Ready) => true,
            (Pending | Extracting | Chunking | Indexing, Failed) => true,
            // Recovery of a run that died mid-stage
            (Extracting | Chunking | Indexing, Pending) => true,
            _ => false,
        };

        if ok {
            Ok(to)
        } else {
            Err((String::from(self), String::from(to)))
        }
    }

    /// Check whether this status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProcessingStatus::Ready | ProcessingStatus::Failed)
    }

    /// Human-readable description of the current step
    pub fn step_description(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "queued for processing",
            ProcessingStatus::Extracting => "loading extracted text",
            ProcessingStatus::Chunking => "building section tree and chunks",
            ProcessingStatus::Indexing => "writing embeddings and search index",
            ProcessingStatus::Ready => "ready",
            ProcessingStatus::Failed => "failed",
        }
    }
}

impl From<String> for ProcessingStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "pending" => ProcessingStatus::Pending,
            "extracting" => ProcessingStatus::Extracting,
            "chunking" => ProcessingStatus::Chunking,
            "indexing" => ProcessingStatus::Indexing,
            "ready" => ProcessingStatus::Ready,
            "failed" => ProcessingStatus::Failed,
            _ => ProcessingStatus::Pending,
        }
    }
}

impl From<ProcessingStatus> for String {
    fn from(status: ProcessingStatus) -> Self {
        match status {
            ProcessingStatus::Pending => "pending".to_string(),
            ProcessingStatus::Extracting => "extracting".to_string(),
            ProcessingStatus::Chunking => "chunking".to_string(),
            ProcessingStatus::Indexing => "indexing".to_string(),
            ProcessingStatus::Ready => "ready".to_string(),
            ProcessingStatus::Failed => "failed".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Conversation thread that owns the document
    pub thread_id: Uuid,

    /// Uploading user (external identity, opaque here)
    #[sea_orm(column_type = "Text")]
    pub user_id: String,

    #[sea_orm(column_type = "Text")]
    pub filename: String,

    /// sha-256 of the extracted text, recorded when chunking completes
    #[sea_orm(column_type = "Text", nullable)]
    pub content_hash: Option<String>,

    /// Plain text produced by the (external) extraction collaborator
    #[sea_orm(column_type = "Text", nullable)]
    pub extracted_text: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// Pipeline stage recorded on failure
    #[sea_orm(column_type = "Text", nullable)]
    pub failed_stage: Option<String>,

    pub chunk_count: i32,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::section::Entity")]
    Sections,

    #[sea_orm(has_many = "super::chunk::Entity")]
    Chunks,

    #[sea_orm(has_many = "super::definition::Entity")]
    Definitions,

    #[sea_orm(has_many = "super::cross_reference::Entity")]
    CrossReferences,
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Sections.def()
    }
}

impl Related<super::chunk::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Chunks.def()
    }
}

impl Related<super::definition::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Definitions.def()
    }
}

impl Related<super::cross_reference::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CrossReferences.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the processing status as an enum
    pub fn processing_status(&self) -> ProcessingStatus {
        ProcessingStatus::from(self.status.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        use ProcessingStatus::*;
        assert_eq!(Pending.transition(Extracting), Ok(Extracting));
        assert_eq!(Extracting.transition(Chunking), Ok(Chunking));
        assert_eq!(Chunking.transition(Indexing), Ok(Indexing));
        assert_eq!(Indexing.transition(Ready), Ok(Ready));
        assert_eq!(Chunking.transition(Failed), Ok(Failed));
    }

    #[test]
    fn test_invalid_transitions() {
        use ProcessingStatus::*;
        assert!(Ready.transition(Chunking).is_err());
        assert!(Failed.transition(Indexing).is_err());
        assert!(Pending.transition(Indexing).is_err());
        assert!(Indexing.transition(Extracting).is_err());
        assert!(Ready.transition(Failed).is_err());
    }

    #[test]
    fn test_recovery_rewinds_to_pending() {
        use ProcessingStatus::*;
        assert_eq!(Extracting.transition(Pending), Ok(Pending));
        assert_eq!(Chunking.transition(Pending), Ok(Pending));
        assert_eq!(Indexing.transition(Pending), Ok(Pending));
        // Terminal statuses never rewind
        assert!(Ready.transition(Pending).is_err());
        assert!(Failed.transition(Pending).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(ProcessingStatus::Ready.is_terminal());
        assert!(ProcessingStatus::Failed.is_terminal());
        assert!(!ProcessingStatus::Indexing.is_terminal());
    }
}
