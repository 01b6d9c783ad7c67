//! Cross-reference entity
//!
//! An in-document pointer from a source chunk to a target section label.
//! Resolution to chunk ids is deferred and idempotent; dangling references
//! resolve to an empty target set.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Kind of cross-reference
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    SeeAlso,
    DefinedTerm,
    Override,
}

impl From<String> for ReferenceKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "defined-term" => ReferenceKind::DefinedTerm,
            "override" => ReferenceKind::Override,
            _ => ReferenceKind::SeeAlso,
        }
    }
}

impl From<ReferenceKind> for String {
    fn from(kind: ReferenceKind) -> Self {
        match kind {
            ReferenceKind::SeeAlso => "see-also".to_string(),
            ReferenceKind::DefinedTerm => "defined-term".to_string(),
            ReferenceKind::Override => "override".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cross_references")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    /// Chunk containing the reference text
    pub source_chunk_id: Uuid,

    /// Target section label as written, e.g. "5.2"
    #[sea_orm(column_type = "Text")]
    pub target_label: String,

    /// Resolved target chunk ids (JSON array); null until resolution
    #[sea_orm(column_type = "JsonBinary", nullable)]
    pub resolved_chunk_ids: Option<Json>,

    #[sea_orm(column_type = "Text")]
    pub kind: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id",
        on_delete = "Cascade"
    )]
    Document,

    #[sea_orm(
        belongs_to = "super::chunk::Entity",
        from = "Column::SourceChunkId",
        to = "super::chunk::Column::Id"
    )]
    SourceChunk,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Get the reference kind as an enum
    pub fn reference_kind(&self) -> ReferenceKind {
        ReferenceKind::from(self.kind.clone())
    }

    /// Parse resolved target chunk ids; empty when unresolved or dangling
    pub fn target_chunk_ids(&self) -> Vec<Uuid> {
        self.resolved_chunk_ids
            .as_ref()
            .and_then(|v| serde_json::from_value::<Vec<Uuid>>(v.clone()).ok())
            .unwrap_or_default()
    }
}
