//! SeaORM entity models
//!
//! Database entities for ClauseTrace

mod chunk;
mod citation;
mod cross_reference;
mod definition;
mod document;
mod section;

pub use document::{
    ActiveModel as DocumentActiveModel, Column as DocumentColumn, Entity as DocumentEntity,
    Model as Document, ProcessingStatus,
};

pub use section::{
    ActiveModel as SectionActiveModel, Column as SectionColumn, Entity as SectionEntity,
    Model as Section,
};

pub use chunk::{
    ActiveModel as ChunkActiveModel, Column as ChunkColumn, Entity as ChunkEntity, Model as Chunk,
};

pub use definition::{
    ActiveModel as DefinitionActiveModel, Column as DefinitionColumn, Entity as DefinitionEntity,
    Model as Definition,
};

pub use cross_reference::{
    ActiveModel as CrossReferenceActiveModel, Column as CrossReferenceColumn,
    Entity as CrossReferenceEntity, Model as CrossReference, ReferenceKind,
};

pub use citation::{
    ActiveModel as CitationActiveModel, Column as CitationColumn, Entity as CitationEntity,
    Model as Citation,
};
