//! ClauseTrace Ingestion Library
//!
//! Turns a document's extracted text into the structured, indexed form the
//! retrieval side queries:
//!
//! 1. Structure parsing - section tree from headings
//! 2. Definition extraction - defined-term catalog
//! 3. Cross-reference extraction - in-document pointers
//! 4. Chunking - sentence-safe token windows with overlap
//! 5. Indexing - embeddings and keyword index writes

pub mod chunker;
pub mod definitions;
pub mod errors;
pub mod indexing;
pub mod processor;
pub mod references;
pub mod structure;

pub use chunker::{chunk_sections, SectionChunk};
pub use errors::IngestionError;
pub use processor::{IngestionProcessor, ProcessingResult, ProcessingStatusView};
pub use structure::{parse_structure, ParsedSection, StructureOutcome};
