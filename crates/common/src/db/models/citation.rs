//! Citation entity
//!
//! Persisted mapping from an answer's citation markers back to source
//! chunks; unresolved markers are stored with a null chunk id.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "citations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Answer the citation belongs to
    pub answer_id: Uuid,

    /// Marker number as it appears in the answer text, 1-based
    pub marker_index: i32,

    /// Source chunk; None when the marker did not resolve
    pub chunk_id: Option<Uuid>,

    /// Span of the marker in the answer text
    pub answer_span_start: i32,

    pub answer_span_end: i32,

    pub resolved: bool,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
