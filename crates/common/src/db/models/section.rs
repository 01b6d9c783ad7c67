//! Section entity
//!
//! Sections form a single rooted tree per document; the root has no parent
//! and spans the whole text.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sections")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    /// Parent section; None for the root
    pub parent_id: Option<Uuid>,

    /// Numbering label as written, e.g. "5.2"
    #[sea_orm(column_type = "Text")]
    pub label: String,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    /// Depth in the tree; root is 0
    pub depth: i32,

    /// Character span in the source text
    pub char_start: i32,

    pub char_end: i32,
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
