//! Multi-round retrieval orchestrator
//!
//! Executes the fixed three-round protocol per query:
//!
//! 1. Hybrid search: vector and keyword signals queried concurrently,
//!    fused into a ranked working set.
//! 2. Reference follow: outgoing cross-references of working-set chunks
//!    resolved to their target chunks. Single hop; references inside the
//!    newly added chunks are not followed.
//! 3. Definition fetch: defined terms occurring in the question or any
//!    gathered chunk pull in their defining chunks.
//!
//! Each round runs exactly once and commits its additions only when it
//! completes. A failed or timed-out signal degrades to the other; the
//! query-level deadline skips remaining rounds, keeping the bundle as
//! accumulated.

use crate::fusion::{fuse, FusedHit};
use crate::query::ProcessedQuery;
use crate::store::RetrievalStore;
use clausetrace_common::config::RetrievalConfig;
use clausetrace_common::db::models::Chunk;
use clausetrace_common::embeddings::Embedder;
use clausetrace_common::errors::{QualityWarning, Result};
use clausetrace_common::index::{SearchHit, SearchIndex, VectorStore};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Signal that contributed a chunk to the bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Signal {
    Semantic,
    Keyword,
    ReferenceFollow,
    DefinitionFetch,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::Semantic => "semantic",
            Signal::Keyword => "keyword",
            Signal::ReferenceFollow => "reference-follow",
            Signal::DefinitionFetch => "definition-fetch",
        }
    }
}

/// Per-query record of one round's signal activity; not persisted
#[derive(Debug, Clone)]
pub struct RetrievalRound {
    pub round: u8,
    pub signal: Signal,
    pub query_variant: String,
    pub chunk_ids: Vec<Uuid>,
}

/// Disambiguation metadata attached to definition-fetched chunks
#[derive(Debug, Clone, Serialize)]
pub struct DefinitionTag {
    pub term_display: String,
    pub ambiguous: bool,
}

/// A chunk gathered during retrieval, before aggregation
#[derive(Debug, Clone)]
pub struct BundleCandidate {
    pub chunk: Chunk,

    /// Fused Round-1 score; 0 for chunks added by rounds 2 and 3
    pub score: f32,

    /// Round that first discovered the chunk
    pub round: u8,

    /// All signals that contributed it, discovery order
    pub signals: Vec<Signal>,

    /// Rounds 2 and 3: the gathered chunk whose reference or term use
    /// pulled this in; `None` for definitions of terms in the question
    pub referrer: Option<Uuid>,

    /// Round-3 chunks: the defined term that pulled this in
    pub term: Option<DefinitionTag>,
}

/// Everything the orchestrator gathered for one query
#[derive(Debug)]
pub struct RetrievalOutcome {
    pub candidates: Vec<BundleCandidate>,
    pub rounds: Vec<RetrievalRound>,
    pub warnings: Vec<QualityWarning>,
}

impl RetrievalOutcome {
    /// True when Round 1 had no usable signal and nothing was retrieved
    pub fn is_total_outage(&self) -> bool {
        let failed_signals = self
            .warnings
            .iter()
            .filter(|w| matches!(w, QualityWarning::RetrievalSignalUnavailable { .. }))
            .count();
        failed_signals >= 2 && self.candidates.is_empty()
    }
}

/// Case-insensitive whole-word occurrence check for a normalized term key
fn contains_term(haystack_lower: &str, key: &str) -> bool {
    if key.is_empty() {
        return false;
    }
    let mut from = 0;
    while let Some(pos) = haystack_lower[from..].find(key) {
        let start = from + pos;
        let end = start + key.len();
        let before_ok = start == 0
            || !haystack_lower[..start]
                .chars()
                .next_back()
                .is_some_and(|c| c.is_alphanumeric());
        let after_ok = !haystack_lower[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphanumeric());
        if before_ok && after_ok {
            return true;
        }
        from = end;
    }
    false
}

/// Retrieval orchestrator
pub struct RetrievalOrchestrator {
    embedder: Arc<dyn Embedder>,
    vector_store: Arc<dyn VectorStore>,
    search_index: Arc<dyn SearchIndex>,
    store: Arc<dyn RetrievalStore>,
    config: RetrievalConfig,
}

impl RetrievalOrchestrator {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector_store: Arc<dyn VectorStore>,
        search_index: Arc<dyn SearchIndex>,
        store: Arc<dyn RetrievalStore>,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            embedder,
            vector_store,
            search_index,
            store,
            config,
        }
    }

    /// Run the full three-round protocol
    #[instrument(skip(self, query), fields(intent = query.intent.as_str()))]
    pub async fn retrieve(
        &self,
        query: &ProcessedQuery,
        document_ids: &[Uuid],
    ) -> Result<RetrievalOutcome> {
        let deadline = Instant::now() + Duration::from_secs(self.config.query_timeout_secs);
        let mut warnings = Vec::new();
        let mut rounds = Vec::new();

        // Round 1: hybrid search
        let round_started = Instant::now();
        let fused = self
            .hybrid_round(query, document_ids, &mut warnings, &mut rounds)
            .await?;

        let working_set: Vec<FusedHit> = fused
            .into_iter()
            .take(self.config.working_set_size)
            .collect();

        let ids: Vec<Uuid> = working_set.iter().map(|h| h.chunk_id).collect();
        let chunk_map: HashMap<Uuid, Chunk> = self
            .store
            .chunks_by_ids(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut candidates: Vec<BundleCandidate> = Vec::new();
        let mut present: HashMap<Uuid, usize> = HashMap::new();
        for hit in &working_set {
            let chunk = match chunk_map.get(&hit.chunk_id) {
                Some(c) => c.clone(),
                None => continue,
            };
            let mut signals = Vec::new();
            if hit.semantic > 0.0 {
                signals.push(Signal::Semantic);
            }
            if hit.keyword > 0.0 {
                signals.push(Signal::Keyword);
            }
            present.insert(hit.chunk_id, candidates.len());
            candidates.push(BundleCandidate {
                chunk,
                score: hit.score,
                round: 1,
                signals,
                referrer: None,
                term: None,
            });
        }
        clausetrace_common::metrics::record_round(
            1,
            round_started.elapsed().as_secs_f64(),
            candidates.len(),
        );

        // Round 2: reference follow, one hop
        if Instant::now() >= deadline {
            warnings.push(QualityWarning::RetrievalTimeout { completed_rounds: 1 });
            return Ok(RetrievalOutcome { candidates, rounds, warnings });
        }
        let round_started = Instant::now();
        let added = self
            .reference_round(&mut candidates, &mut present, &mut rounds)
            .await?;
        clausetrace_common::metrics::record_round(2, round_started.elapsed().as_secs_f64(), added);

        // Round 3: definition fetch
        if Instant::now() >= deadline {
            warnings.push(QualityWarning::RetrievalTimeout { completed_rounds: 2 });
            return Ok(RetrievalOutcome { candidates, rounds, warnings });
        }
        let round_started = Instant::now();
        let added = self
            .definition_round(query, document_ids, &mut candidates, &mut present, &mut rounds)
            .await?;
        clausetrace_common::metrics::record_round(3, round_started.elapsed().as_secs_f64(), added);

        Ok(RetrievalOutcome { candidates, rounds, warnings })
    }

    /// Round 1 only, for the search endpoint
    pub async fn search(
        &self,
        query: &ProcessedQuery,
        document_ids: &[Uuid],
        limit: usize,
    ) -> Result<(Vec<(FusedHit, Chunk)>, Vec<QualityWarning>)> {
        let mut warnings = Vec::new();
        let mut rounds = Vec::new();
        let fused = self
            .hybrid_round(query, document_ids, &mut warnings, &mut rounds)
            .await?;

        let top: Vec<FusedHit> = fused.into_iter().take(limit).collect();
        let ids: Vec<Uuid> = top.iter().map(|h| h.chunk_id).collect();
        let chunk_map: HashMap<Uuid, Chunk> = self
            .store
            .chunks_by_ids(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let results = top
            .into_iter()
            .filter_map(|hit| chunk_map.get(&hit.chunk_id).cloned().map(|c| (hit, c)))
            .collect();
        Ok((results, warnings))
    }

    async fn hybrid_round(
        &self,
        query: &ProcessedQuery,
        document_ids: &[Uuid],
        warnings: &mut Vec<QualityWarning>,
        rounds: &mut Vec<RetrievalRound>,
    ) -> Result<Vec<FusedHit>> {
        let signal_timeout = Duration::from_secs(self.config.signal_timeout_secs);
        let top_k = self.config.signal_top_k;

        let semantic_call = async {
            let embedding = self.embedder.embed(&query.normalized).await?;
            self.vector_store
                .query(&embedding, document_ids, top_k)
                .await
        };
        let keyword_call = self
            .search_index
            .search(&query.normalized, document_ids, top_k);

        let (semantic_res, keyword_res) = tokio::join!(
            tokio::time::timeout(signal_timeout, semantic_call),
            tokio::time::timeout(signal_timeout, keyword_call),
        );

        let semantic = self.flatten_signal(Signal::Semantic, semantic_res, warnings);
        let keyword = self.flatten_signal(Signal::Keyword, keyword_res, warnings);

        rounds.push(RetrievalRound {
            round: 1,
            signal: Signal::Semantic,
            query_variant: query.normalized.clone(),
            chunk_ids: semantic.iter().map(|h| h.chunk_id).collect(),
        });
        rounds.push(RetrievalRound {
            round: 1,
            signal: Signal::Keyword,
            query_variant: query.normalized.clone(),
            chunk_ids: keyword.iter().map(|h| h.chunk_id).collect(),
        });

        Ok(fuse(&semantic, &keyword, self.config.fusion))
    }

    /// Unwrap a timed signal call, degrading failures to a warning
    fn flatten_signal(
        &self,
        signal: Signal,
        result: std::result::Result<Result<Vec<SearchHit>>, tokio::time::error::Elapsed>,
        warnings: &mut Vec<QualityWarning>,
    ) -> Vec<SearchHit> {
        match result {
            Ok(Ok(hits)) => hits,
            Ok(Err(e)) => {
                warn!(signal = signal.as_str(), error = %e, "Retrieval signal failed");
                warnings.push(QualityWarning::RetrievalSignalUnavailable {
                    signal: signal.as_str().to_string(),
                });
                vec![]
            }
            Err(_) => {
                warn!(signal = signal.as_str(), "Retrieval signal timed out");
                warnings.push(QualityWarning::RetrievalSignalUnavailable {
                    signal: signal.as_str().to_string(),
                });
                vec![]
            }
        }
    }

    async fn reference_round(
        &self,
        candidates: &mut Vec<BundleCandidate>,
        present: &mut HashMap<Uuid, usize>,
        rounds: &mut Vec<RetrievalRound>,
    ) -> Result<usize> {
        let source_ids: Vec<Uuid> = candidates.iter().map(|c| c.chunk.id).collect();
        let references = self
            .store
            .cross_references_by_source_chunks(&source_ids)
            .await?;

        // Staged locally, committed only after every resolution is in hand
        let mut staged: Vec<(Uuid, Uuid)> = Vec::new();
        for reference in &references {
            for target in reference.target_chunk_ids() {
                if let Some(&idx) = present.get(&target) {
                    let signals = &mut candidates[idx].signals;
                    if !signals.contains(&Signal::ReferenceFollow) {
                        signals.push(Signal::ReferenceFollow);
                    }
                } else if !staged.iter().any(|(id, _)| *id == target) {
                    staged.push((target, reference.source_chunk_id));
                }
            }
        }

        let target_ids: Vec<Uuid> = staged.iter().map(|(id, _)| *id).collect();
        let chunk_map: HashMap<Uuid, Chunk> = self
            .store
            .chunks_by_ids(&target_ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut added_ids = Vec::new();
        for (target, referrer) in staged {
            let chunk = match chunk_map.get(&target) {
                Some(c) => c.clone(),
                None => continue,
            };
            present.insert(target, candidates.len());
            candidates.push(BundleCandidate {
                chunk,
                score: 0.0,
                round: 2,
                signals: vec![Signal::ReferenceFollow],
                referrer: Some(referrer),
                term: None,
            });
            added_ids.push(target);
        }

        debug!(added = added_ids.len(), "Reference round committed");
        let added = added_ids.len();
        rounds.push(RetrievalRound {
            round: 2,
            signal: Signal::ReferenceFollow,
            query_variant: String::new(),
            chunk_ids: added_ids,
        });
        Ok(added)
    }

    async fn definition_round(
        &self,
        query: &ProcessedQuery,
        document_ids: &[Uuid],
        candidates: &mut Vec<BundleCandidate>,
        present: &mut HashMap<Uuid, usize>,
        rounds: &mut Vec<RetrievalRound>,
    ) -> Result<usize> {
        let definitions = self.store.definitions_by_documents(document_ids).await?;

        // Haystack snapshot taken before any round-3 additions, so terms
        // occurring only inside fetched definition chunks do not recurse
        let lowered: Vec<(Uuid, String)> = candidates
            .iter()
            .map(|c| (c.chunk.id, c.chunk.content.to_lowercase()))
            .collect();
        let mut haystack = query.normalized.clone();
        for (_, content) in &lowered {
            haystack.push(' ');
            haystack.push_str(content);
        }

        let mut staged: Vec<(Uuid, DefinitionTag, Option<Uuid>)> = Vec::new();
        for definition in &definitions {
            let defining_chunk_id = match definition.defining_chunk_id {
                Some(id) => id,
                None => continue,
            };
            if !contains_term(&haystack, &definition.term_key) {
                continue;
            }

            // Chunk-anchored definitions record their anchor so the
            // aggregator can drop them when the anchor is evicted;
            // question-anchored ones do not
            let anchor = if contains_term(&query.normalized, &definition.term_key) {
                None
            } else {
                lowered
                    .iter()
                    .find(|(_, content)| contains_term(content, &definition.term_key))
                    .map(|(id, _)| *id)
            };

            let tag = DefinitionTag {
                term_display: definition.term_display.clone(),
                ambiguous: definition.ambiguous,
            };
            if let Some(&idx) = present.get(&defining_chunk_id) {
                let candidate = &mut candidates[idx];
                if !candidate.signals.contains(&Signal::DefinitionFetch) {
                    candidate.signals.push(Signal::DefinitionFetch);
                }
                if candidate.term.is_none() {
                    candidate.term = Some(tag);
                }
            } else if !staged.iter().any(|(id, _, _)| *id == defining_chunk_id) {
                staged.push((defining_chunk_id, tag, anchor));
            }
        }

        let ids: Vec<Uuid> = staged.iter().map(|(id, _, _)| *id).collect();
        let chunk_map: HashMap<Uuid, Chunk> = self
            .store
            .chunks_by_ids(&ids)
            .await?
            .into_iter()
            .map(|c| (c.id, c))
            .collect();

        let mut added_ids = Vec::new();
        for (id, tag, anchor) in staged {
            let chunk = match chunk_map.get(&id) {
                Some(c) => c.clone(),
                None => continue,
            };
            present.insert(id, candidates.len());
            candidates.push(BundleCandidate {
                chunk,
                score: 0.0,
                round: 3,
                signals: vec![Signal::DefinitionFetch],
                referrer: anchor,
                term: Some(tag),
            });
            added_ids.push(id);
        }

        debug!(added = added_ids.len(), "Definition round committed");
        let added = added_ids.len();
        rounds.push(RetrievalRound {
            round: 3,
            signal: Signal::DefinitionFetch,
            query_variant: String::new(),
            chunk_ids: added_ids,
        });
        Ok(added)
    }
}
