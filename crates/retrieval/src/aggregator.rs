//! Context aggregator
//!
//! Turns the orchestrator's candidates into the ordered, deduplicated,
//! budget-bounded bundle handed to the generator. Ordering: Round-1 chunks
//! by fused score descending, Round-2 chunks grouped directly after the
//! chunk that referenced them, Round-3 chunks appended last. Budget
//! eviction drops lowest-scored Round-1 chunks first, then expansion
//! chunks from the back. A chunk is protected only while the chunk it
//! supplies a reference or definition to is itself still kept; evicting
//! a referrer unprotects its followers on the next pass.

use crate::orchestrator::{BundleCandidate, DefinitionTag, Signal};
use clausetrace_common::db::models::Chunk;
use serde::Serialize;
use uuid::Uuid;

/// Where a bundle entry came from
#[derive(Debug, Clone, Serialize)]
pub struct Provenance {
    /// Round that first discovered the chunk
    pub round: u8,

    /// First-seen signal
    pub signal: Signal,

    /// Every signal that contributed the chunk
    pub all_signals: Vec<Signal>,
}

/// One chunk in the final bundle
#[derive(Debug, Clone)]
pub struct BundleEntry {
    pub chunk: Chunk,
    pub score: f32,
    pub provenance: Provenance,
    pub referrer: Option<Uuid>,
    pub term: Option<DefinitionTag>,
}

/// The assembled context bundle
#[derive(Debug)]
pub struct ContextBundle {
    /// Final order: the position index is what citation markers refer to
    pub entries: Vec<BundleEntry>,

    /// Budget tokens consumed (overlap discounted)
    pub total_tokens: usize,
}

impl ContextBundle {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn chunk_ids(&self) -> Vec<Uuid> {
        self.entries.iter().map(|e| e.chunk.id).collect()
    }
}

/// Protection is relative to the kept set
///
/// A reference target is protected while its referrer is still in the
/// bundle. A definition chunk is protected while its anchor chunk is, or
/// unconditionally when the term came from the question itself (no
/// referrer recorded).
fn is_protected(idx: usize, ordered: &[BundleEntry]) -> bool {
    let entry = &ordered[idx];
    let referrer_kept = entry.referrer.is_some_and(|referrer| {
        ordered
            .iter()
            .enumerate()
            .any(|(j, e)| j != idx && e.chunk.id == referrer)
    });
    let signals = &entry.provenance.all_signals;

    (signals.contains(&Signal::ReferenceFollow) && referrer_kept)
        || (signals.contains(&Signal::DefinitionFetch)
            && (entry.referrer.is_none() || referrer_kept))
}

/// Assemble the bundle from retrieval candidates under a token budget
pub fn aggregate(candidates: Vec<BundleCandidate>, token_budget: usize) -> ContextBundle {
    // Dedup by chunk id; first-seen provenance wins, later signals merge
    let mut entries: Vec<BundleEntry> = Vec::new();
    for candidate in candidates {
        if let Some(existing) = entries.iter_mut().find(|e| e.chunk.id == candidate.chunk.id) {
            for signal in candidate.signals {
                if !existing.provenance.all_signals.contains(&signal) {
                    existing.provenance.all_signals.push(signal);
                }
            }
            if existing.term.is_none() {
                existing.term = candidate.term;
            }
            if existing.referrer.is_none() {
                existing.referrer = candidate.referrer;
            }
            continue;
        }
        let first_signal = candidate.signals.first().copied().unwrap_or(Signal::Semantic);
        entries.push(BundleEntry {
            provenance: Provenance {
                round: candidate.round,
                signal: first_signal,
                all_signals: candidate.signals,
            },
            chunk: candidate.chunk,
            score: candidate.score,
            referrer: candidate.referrer,
            term: candidate.term,
        });
    }

    // Order: scored round-1 list with round-2 followers inlined, round 3 last
    let mut round1: Vec<BundleEntry> = Vec::new();
    let mut round2: Vec<BundleEntry> = Vec::new();
    let mut round3: Vec<BundleEntry> = Vec::new();
    for entry in entries {
        match entry.provenance.round {
            1 => round1.push(entry),
            2 => round2.push(entry),
            _ => round3.push(entry),
        }
    }
    round1.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut ordered: Vec<BundleEntry> = Vec::new();
    for entry in round1 {
        let referrer_id = entry.chunk.id;
        ordered.push(entry);
        let mut i = 0;
        while i < round2.len() {
            if round2[i].referrer == Some(referrer_id) {
                ordered.push(round2.remove(i));
            } else {
                i += 1;
            }
        }
    }
    // Round-2 entries whose referrer was evicted upstream or deduplicated
    ordered.append(&mut round2);
    ordered.append(&mut round3);

    // Budget enforcement; protection is recomputed each pass so evicting
    // a referrer exposes its followers
    let mut total: usize = ordered.iter().map(|e| e.chunk.budget_tokens()).sum();
    while total > token_budget {
        let victim = ordered
            .iter()
            .enumerate()
            .filter(|(i, e)| e.provenance.round == 1 && !is_protected(*i, &ordered))
            .min_by(|(_, a), (_, b)| {
                a.score
                    .partial_cmp(&b.score)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(i, _)| i)
            .or_else(|| {
                // Round-1 exhausted; trim unprotected expansion chunks from
                // the back
                (0..ordered.len())
                    .rev()
                    .find(|&i| ordered[i].provenance.round != 1 && !is_protected(i, &ordered))
            });

        match victim {
            Some(i) => {
                let removed = ordered.remove(i);
                total -= removed.chunk.budget_tokens();
            }
            // Everything left is protected; the budget yields
            None => break,
        }
    }

    ContextBundle {
        entries: ordered,
        total_tokens: total,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_with_tokens(tokens: i32) -> Chunk {
        Chunk {
            id: Uuid::new_v4(),
            document_id: Uuid::new_v4(),
            section_id: Uuid::new_v4(),
            section_path: "1".to_string(),
            chunk_index: 0,
            content: "content".to_string(),
            token_count: tokens,
            char_start: 0,
            char_end: 7,
            overlap_tokens_start: 0,
            overlap_tokens_end: 0,
            embedding: None,
            embedding_model: None,
            search_text: None,
            created_at: chrono::Utc::now().into(),
        }
    }

    fn candidate(round: u8, score: f32, signals: Vec<Signal>, tokens: i32) -> BundleCandidate {
        BundleCandidate {
            chunk: chunk_with_tokens(tokens),
            score,
            round,
            signals,
            referrer: None,
            term: None,
        }
    }

    #[test]
    fn test_round2_grouped_after_referrer() {
        let mut first = candidate(1, 0.9, vec![Signal::Semantic], 10);
        let second = candidate(1, 0.5, vec![Signal::Keyword], 10);
        let mut follower = candidate(2, 0.0, vec![Signal::ReferenceFollow], 10);
        follower.referrer = Some(first.chunk.id);
        let trailing = candidate(3, 0.0, vec![Signal::DefinitionFetch], 10);

        let first_id = first.chunk.id;
        let follower_id = follower.chunk.id;
        first.score = 0.9;

        let bundle = aggregate(vec![first, second, follower, trailing], 1000);
        assert_eq!(bundle.entries[0].chunk.id, first_id);
        assert_eq!(bundle.entries[1].chunk.id, follower_id);
        assert_eq!(bundle.entries[3].provenance.round, 3);
    }

    #[test]
    fn test_duplicate_merges_signals_first_seen_provenance_wins() {
        let c1 = candidate(1, 0.8, vec![Signal::Semantic], 10);
        let mut dup = candidate(3, 0.0, vec![Signal::DefinitionFetch], 10);
        dup.chunk = c1.chunk.clone();

        let bundle = aggregate(vec![c1, dup], 1000);
        assert_eq!(bundle.entries.len(), 1);
        let entry = &bundle.entries[0];
        assert_eq!(entry.provenance.round, 1);
        assert_eq!(entry.provenance.signal, Signal::Semantic);
        assert!(entry.provenance.all_signals.contains(&Signal::DefinitionFetch));
    }

    #[test]
    fn test_budget_evicts_lowest_scored_round1_first() {
        let high = candidate(1, 0.9, vec![Signal::Semantic], 100);
        let low = candidate(1, 0.2, vec![Signal::Semantic], 100);
        let definition = candidate(3, 0.0, vec![Signal::DefinitionFetch], 100);

        let high_id = high.chunk.id;
        let def_id = definition.chunk.id;

        let bundle = aggregate(vec![high, low, definition], 200);
        let ids = bundle.chunk_ids();
        assert!(ids.contains(&high_id));
        assert!(ids.contains(&def_id), "definition supplier must survive eviction");
        assert_eq!(ids.len(), 2);
        assert!(bundle.total_tokens <= 200);
    }

    #[test]
    fn test_protected_round1_chunk_never_evicted() {
        // Lowest-scored round-1 chunk also supplies a definition
        let mut protected = candidate(1, 0.1, vec![Signal::Semantic], 100);
        protected
            .signals
            .push(Signal::DefinitionFetch);
        let midweight = candidate(1, 0.5, vec![Signal::Semantic], 100);
        let top = candidate(1, 0.9, vec![Signal::Semantic], 100);

        let protected_id = protected.chunk.id;
        let mid_id = midweight.chunk.id;

        let bundle = aggregate(vec![protected, midweight, top], 200);
        let ids = bundle.chunk_ids();
        assert!(ids.contains(&protected_id));
        assert!(!ids.contains(&mid_id), "unprotected lower-priority chunk goes first");
    }

    #[test]
    fn test_budget_bounds_orphaned_reference_chunks() {
        // Round-2 chunks whose referrers never made the bundle carry no
        // protection and get trimmed from the back until the budget holds
        let candidates: Vec<BundleCandidate> = (0..5)
            .map(|_| {
                let mut c = candidate(2, 0.0, vec![Signal::ReferenceFollow], 1000);
                c.referrer = Some(Uuid::new_v4());
                c
            })
            .collect();
        let keep_ids: Vec<Uuid> = candidates.iter().take(2).map(|c| c.chunk.id).collect();

        let bundle = aggregate(candidates, 2000);
        assert!(bundle.total_tokens <= 2000);
        assert_eq!(bundle.chunk_ids(), keep_ids);
    }

    #[test]
    fn test_definition_loses_protection_once_its_anchor_is_evicted() {
        let mut anchor = candidate(2, 0.0, vec![Signal::ReferenceFollow], 100);
        anchor.referrer = Some(Uuid::new_v4());
        let mut definition = candidate(3, 0.0, vec![Signal::DefinitionFetch], 100);
        definition.referrer = Some(anchor.chunk.id);

        // First pass evicts the orphaned anchor, second the definition it
        // was shielding
        let bundle = aggregate(vec![anchor, definition], 50);
        assert!(bundle.entries.is_empty());
        assert_eq!(bundle.total_tokens, 0);
    }

    #[test]
    fn test_question_anchored_definitions_yield_the_budget() {
        // Definitions of terms used in the question itself have no
        // referrer and are never evicted; the budget yields
        let defs: Vec<BundleCandidate> = (0..2)
            .map(|_| candidate(3, 0.0, vec![Signal::DefinitionFetch], 100))
            .collect();

        let bundle = aggregate(defs, 100);
        assert_eq!(bundle.entries.len(), 2);
        assert_eq!(bundle.total_tokens, 200);
    }

    #[test]
    fn test_total_tokens_discounts_overlap() {
        let mut c = candidate(1, 0.9, vec![Signal::Semantic], 100);
        c.chunk.overlap_tokens_start = 30;

        let bundle = aggregate(vec![c], 1000);
        assert_eq!(bundle.total_tokens, 70);
    }
}
