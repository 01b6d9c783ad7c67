//! Citation tracker
//!
//! Parses `[n]` markers out of generated answer text and maps each one to
//! the chunk at that 1-based bundle position. A marker pointing outside
//! the bundle is flagged as unresolved and kept in the result; it is
//! never silently dropped. This is the hallucination guard.

use regex_lite::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// One citation marker found in the answer text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedCitation {
    /// The number inside the marker, as written
    pub marker_index: i32,

    /// Chunk at that bundle position; None when the marker is unresolved
    pub chunk_id: Option<Uuid>,

    /// Byte span of the marker in the answer text
    pub answer_span_start: i32,
    pub answer_span_end: i32,

    pub resolved: bool,
}

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(\d{1,3})\]").unwrap())
}

/// Map every citation marker in the answer to its bundle chunk
///
/// `bundle_chunk_ids` is the bundle in final order; marker `[1]` refers to
/// the first entry.
pub fn track_citations(answer: &str, bundle_chunk_ids: &[Uuid]) -> Vec<TrackedCitation> {
    let mut citations = Vec::new();

    for caps in marker_re().captures_iter(answer) {
        let (whole, number) = match (caps.get(0), caps.get(1)) {
            (Some(w), Some(n)) => (w, n),
            _ => continue,
        };
        let marker_index: i32 = match number.as_str().parse() {
            Ok(n) => n,
            Err(_) => continue,
        };

        let chunk_id = if marker_index >= 1 {
            bundle_chunk_ids.get(marker_index as usize - 1).copied()
        } else {
            None
        };

        citations.push(TrackedCitation {
            marker_index,
            chunk_id,
            answer_span_start: whole.start() as i32,
            answer_span_end: whole.end() as i32,
            resolved: chunk_id.is_some(),
        });
    }

    citations
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_markers_map_to_bundle_positions() {
        let bundle = vec![Uuid::new_v4(), Uuid::new_v4()];
        let answer = "Notice is thirty days [1]. Renewal is automatic [2].";

        let citations = track_citations(answer, &bundle);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].chunk_id, Some(bundle[0]));
        assert_eq!(citations[1].chunk_id, Some(bundle[1]));
        assert!(citations.iter().all(|c| c.resolved));
    }

    #[test]
    fn test_out_of_range_marker_reported_as_unresolved() {
        let bundle = vec![Uuid::new_v4()];
        let answer = "Supported claim [1]. Invented claim [7].";

        let citations = track_citations(answer, &bundle);
        assert_eq!(citations.len(), 2);
        assert!(citations[0].resolved);

        let bad = &citations[1];
        assert_eq!(bad.marker_index, 7);
        assert_eq!(bad.chunk_id, None);
        assert!(!bad.resolved);
    }

    #[test]
    fn test_marker_spans_cover_the_marker_text() {
        let bundle = vec![Uuid::new_v4()];
        let answer = "Claim [1].";

        let citations = track_citations(answer, &bundle);
        let span = &answer[citations[0].answer_span_start as usize
            ..citations[0].answer_span_end as usize];
        assert_eq!(span, "[1]");
    }

    #[test]
    fn test_repeated_marker_yields_one_citation_per_occurrence() {
        let bundle = vec![Uuid::new_v4()];
        let answer = "First point [1]. Second point also [1].";

        let citations = track_citations(answer, &bundle);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].chunk_id, citations[1].chunk_id);
    }

    #[test]
    fn test_answer_without_markers_yields_no_citations() {
        assert!(track_citations("No citations here.", &[Uuid::new_v4()]).is_empty());
    }
}
