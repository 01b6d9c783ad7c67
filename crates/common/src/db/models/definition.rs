//! Definition entity
//!
//! One row per defined-term declaration. Multiple rows may share a term key;
//! lookups return all of them with an ambiguity flag.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "definitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    /// Term as written, original casing
    #[sea_orm(column_type = "Text")]
    pub term_display: String,

    /// Normalized lookup key (lowercased, articles and plural trimmed)
    #[sea_orm(column_type = "Text")]
    pub term_key: String,

    /// Full defining sentence
    #[sea_orm(column_type = "Text")]
    pub definition_text: String,

    /// Chunk containing the declaration; assigned after chunking
    pub defining_chunk_id: Option<Uuid>,

    /// Section path the definition applies from (recorded, not enforced)
    #[sea_orm(column_type = "Text", nullable)]
    pub scope_section_path: Option<String>,

    /// Character offset of the declaration in the source text
    pub char_start: i32,

    /// True when another declaration in the same document shares the term key
    pub ambiguous: bool,
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
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
