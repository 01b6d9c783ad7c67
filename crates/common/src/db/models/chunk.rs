//! Chunk entity
//!
//! Chunks partition a document's text in source order; only the declared
//! overlap tokens are duplicated between neighbors.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "chunks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    /// Section owning this chunk
    pub section_id: Uuid,

    /// Ordered section labels from root, "/"-joined (e.g. "5/5.2")
    #[sea_orm(column_type = "Text")]
    pub section_path: String,

    /// Zero-based position in document order
    pub chunk_index: i32,

    /// Source text slice (no section prefix, no overlap)
    #[sea_orm(column_type = "Text")]
    pub content: String,

    /// Token count of content (whitespace tokens)
    pub token_count: i32,

    /// Character offsets into the source text
    pub char_start: i32,

    pub char_end: i32,

    /// Tokens at the start shared with the previous chunk
    pub overlap_tokens_start: i32,

    /// Tokens at the end repeated into the next chunk
    pub overlap_tokens_end: i32,

    /// pgvector embedding stored as text for SeaORM compatibility;
    /// vector operations go through raw SQL
    #[sea_orm(column_type = "Text", nullable)]
    pub embedding: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub embedding_model: Option<String>,

    /// Text written to the keyword index (section-path prefixed);
    /// null until the indexing stage has run
    #[sea_orm(column_type = "Text", nullable)]
    pub search_text: Option<String>,

    pub created_at: DateTimeWithTimeZone,
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
        belongs_to = "super::section::Entity",
        from = "Column::SectionId",
        to = "super::section::Column::Id"
    )]
    Section,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl Related<super::section::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Section.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Retrieval/display text: the section path label prefixed to the content
    ///
    /// The prefix is not part of the stored character-offset mapping.
    pub fn display_text(&self) -> String {
        if self.section_path.is_empty() {
            self.content.clone()
        } else {
            format!("[Section {}] {}", self.section_path, self.content)
        }
    }

    /// Tokens counted against a context budget, overlap discounted
    pub fn budget_tokens(&self) -> usize {
        (self.token_count - self.overlap_tokens_start).max(0) as usize
    }
}
