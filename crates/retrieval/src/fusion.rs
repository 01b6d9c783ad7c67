//! Hybrid score fusion
//!
//! Merges the semantic and keyword result lists for Round 1. Each signal's
//! scores are max-normalized independently, then combined as a weighted
//! sum. A chunk present in only one list keeps that signal's normalized
//! score times the signal's weight; a chunk in both lists gets both
//! contributions, so it outranks equal-score single-signal chunks.

use clausetrace_common::config::FusionWeights;
use clausetrace_common::index::SearchHit;
use std::collections::HashMap;
use uuid::Uuid;

/// A chunk after fusion with its per-signal contributions
#[derive(Debug, Clone)]
pub struct FusedHit {
    pub chunk_id: Uuid,

    /// Combined weighted score
    pub score: f32,

    /// Max-normalized semantic score, 0 when absent from that list
    pub semantic: f32,

    /// Max-normalized keyword score, 0 when absent from that list
    pub keyword: f32,

    /// Highlight fragments carried over from the keyword signal
    pub highlights: Vec<String>,
}

fn max_score(hits: &[SearchHit]) -> f32 {
    hits.iter().map(|h| h.score).fold(0.0, f32::max)
}

/// Fuse the two Round-1 result lists into one ranked list
pub fn fuse(semantic: &[SearchHit], keyword: &[SearchHit], weights: FusionWeights) -> Vec<FusedHit> {
    let semantic_max = max_score(semantic);
    let keyword_max = max_score(keyword);

    let mut merged: HashMap<Uuid, FusedHit> = HashMap::new();

    for hit in semantic {
        let normalized = if semantic_max > 0.0 {
            hit.score / semantic_max
        } else {
            0.0
        };
        merged
            .entry(hit.chunk_id)
            .or_insert_with(|| FusedHit {
                chunk_id: hit.chunk_id,
                score: 0.0,
                semantic: 0.0,
                keyword: 0.0,
                highlights: Vec::new(),
            })
            .semantic = normalized;
    }

    for hit in keyword {
        let normalized = if keyword_max > 0.0 {
            hit.score / keyword_max
        } else {
            0.0
        };
        let entry = merged.entry(hit.chunk_id).or_insert_with(|| FusedHit {
            chunk_id: hit.chunk_id,
            score: 0.0,
            semantic: 0.0,
            keyword: 0.0,
            highlights: Vec::new(),
        });
        entry.keyword = normalized;
        entry.highlights = hit.highlights.clone();
    }

    let mut fused: Vec<FusedHit> = merged
        .into_values()
        .map(|mut hit| {
            hit.score = hit.semantic * weights.semantic + hit.keyword * weights.keyword;
            hit
        })
        .collect();

    // Descending by score; chunk id breaks ties so ordering is stable
    fused.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: Uuid, score: f32) -> SearchHit {
        SearchHit::new(id, score)
    }

    #[test]
    fn test_both_signals_outrank_single_signal_at_equal_weights() {
        let shared = Uuid::new_v4();
        let vector_only = Uuid::new_v4();
        let keyword_only = Uuid::new_v4();

        let semantic = vec![hit(shared, 0.9), hit(vector_only, 0.9)];
        let keyword = vec![hit(shared, 5.0), hit(keyword_only, 5.0)];

        let fused = fuse(&semantic, &keyword, FusionWeights::default());
        assert_eq!(fused[0].chunk_id, shared);
        assert!(fused[0].score > fused[1].score);
    }

    #[test]
    fn test_single_signal_keeps_weighted_normalized_score() {
        let id = Uuid::new_v4();
        let semantic = vec![hit(id, 0.8), hit(Uuid::new_v4(), 0.4)];

        let fused = fuse(&semantic, &[], FusionWeights { semantic: 0.5, keyword: 0.5 });
        let top = fused.iter().find(|h| h.chunk_id == id).unwrap();
        // Top semantic hit normalizes to 1.0, weighted by 0.5
        assert!((top.score - 0.5).abs() < 1e-6);
        assert_eq!(top.keyword, 0.0);
    }

    #[test]
    fn test_scores_normalized_per_signal() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        // Keyword scores on a different scale than cosine similarity
        let semantic = vec![hit(a, 0.9)];
        let keyword = vec![hit(b, 40.0)];

        let fused = fuse(&semantic, &keyword, FusionWeights::default());
        let score_a = fused.iter().find(|h| h.chunk_id == a).unwrap().score;
        let score_b = fused.iter().find(|h| h.chunk_id == b).unwrap().score;
        assert!((score_a - score_b).abs() < 1e-6);
    }

    #[test]
    fn test_empty_lists_fuse_to_empty() {
        assert!(fuse(&[], &[], FusionWeights::default()).is_empty());
    }

    #[test]
    fn test_highlights_carried_from_keyword_signal() {
        let id = Uuid::new_v4();
        let mut kw = hit(id, 3.0);
        kw.highlights = vec!["<b>terminate</b> upon notice".to_string()];

        let fused = fuse(&[hit(id, 0.7)], &[kw], FusionWeights::default());
        assert_eq!(fused[0].highlights.len(), 1);
    }
}
