//! ClauseTrace Retrieval Engine
//!
//! Query-time side of the system: preprocesses the question, runs the
//! multi-round retrieval protocol (hybrid search, reference follow,
//! definition fetch), assembles a budgeted context bundle, checks it for
//! numeric conflicts, and maps generated-answer citations back to chunks.

pub mod aggregator;
pub mod citations;
pub mod fusion;
pub mod numeric;
pub mod orchestrator;
pub mod query;
pub mod service;
pub mod store;

pub use aggregator::{aggregate, BundleEntry, ContextBundle, Provenance};
pub use citations::{track_citations, TrackedCitation};
pub use fusion::{fuse, FusedHit};
pub use numeric::{check_conflicts, ConflictRecord, ConflictValue, Dimension};
pub use orchestrator::{
    BundleCandidate, DefinitionTag, RetrievalOrchestrator, RetrievalOutcome, RetrievalRound,
    Signal,
};
pub use query::{process_query, ProcessedQuery, QueryIntent};
pub use service::{CitationView, QueryAnswer, RetrievalService, SearchOutcome, SearchResultView};
pub use store::RetrievalStore;
