//! ClauseTrace Common Library
//!
//! Shared code for the ClauseTrace services including:
//! - Database entities and repository
//! - Processing status state machine
//! - Embedding provider abstraction
//! - Vector store and search index clients
//! - Answer generator client
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod db;
pub mod embeddings;
pub mod errors;
pub mod generator;
pub mod index;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::Repository;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};
pub use generator::AnswerGenerator;
pub use index::{SearchHit, SearchIndex, VectorStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 1536;

/// sha-256 of a document's extracted text, hex-encoded
///
/// Recorded on the document row when chunking completes, so operators can
/// tell which text version a chunk set was derived from.
pub fn content_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(text.as_bytes()))
}
