//! Legal chunker
//!
//! Splits a structured document into the ordered chunk sequence. Chunks are
//! token-count windows that never split inside a sentence and never mix
//! sentences from different sections. Each chunk after the first repeats
//! the trailing overlap tokens of the previous chunk; the repeated region
//! is part of the chunk's source slice and is recorded in the overlap
//! markers so downstream budgeting can discount it.
//!
//! Tokens are whitespace-delimited words. Offsets are byte offsets into the
//! source text. Sentence spans are contiguous and cover the whole text, so
//! the chunk bodies (content minus the leading overlap) partition it.

use crate::structure::{owning_section, section_path, ParsedSection};
use clausetrace_common::config::ChunkingConfig;
use tracing::debug;
use uuid::Uuid;

/// Abbreviations that end in a period without ending a sentence
const LEGAL_ABBREVIATIONS: &[&str] = &["no.", "sec.", "art.", "v.", "etc.", "e.g.", "i.e."];

/// A chunk bound to its owning section
#[derive(Debug, Clone, PartialEq)]
pub struct SectionChunk {
    pub section_id: Uuid,

    /// Ordered section labels from root, "/"-joined
    pub section_path: String,

    /// Zero-based position in document order
    pub chunk_index: i32,

    /// Source slice, including the leading overlap region
    pub content: String,

    pub char_start: usize,
    pub char_end: usize,

    /// Token count of content, overlap included
    pub token_count: i32,

    /// Leading tokens repeated from the previous chunk
    pub overlap_tokens_start: i32,

    /// Trailing tokens repeated into the next chunk
    pub overlap_tokens_end: i32,
}

/// Split text into contiguous sentence spans
///
/// A sentence ends at `.`, `!`, `?`, or `;` followed by whitespace, unless
/// the terminator belongs to a known legal abbreviation. Each span extends
/// through the whitespace that follows it, so the spans cover the text with
/// no gaps.
pub fn split_sentences(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if matches!(c, '.' | '!' | '?' | ';') {
            let next_is_ws = bytes
                .get(i + 1)
                .map(|b| (*b as char).is_ascii_whitespace())
                .unwrap_or(true);
            if next_is_ws && !ends_with_abbreviation(&text[start..=i]) {
                let mut end = i + 1;
                while end < bytes.len() && (bytes[end] as char).is_ascii_whitespace() {
                    end += 1;
                }
                spans.push((start, end));
                start = end;
                i = end;
                continue;
            }
        }
        i += 1;
    }

    if start < bytes.len() {
        spans.push((start, bytes.len()));
    }

    spans
}

fn ends_with_abbreviation(upto: &str) -> bool {
    let last_word = upto
        .rsplit(|c: char| c.is_ascii_whitespace())
        .next()
        .unwrap_or("");
    let lower = last_word.to_ascii_lowercase();
    LEGAL_ABBREVIATIONS.iter().any(|a| lower == *a)
}

/// Whitespace-token count
pub fn count_tokens(text: &str) -> usize {
    text.split_ascii_whitespace().count()
}

/// Byte spans of whitespace tokens
fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_ascii_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

fn first_non_ws(text: &str, start: usize, end: usize) -> usize {
    text[start..end]
        .char_indices()
        .find(|(_, c)| !c.is_ascii_whitespace())
        .map(|(i, _)| start + i)
        .unwrap_or(start)
}

struct PendingChunk {
    body_start: usize,
    body_end: usize,
    tokens: usize,
    section_id: Uuid,
}

/// Produce the ordered chunk sequence for a document
///
/// Deterministic for identical input text, sections, and config.
pub fn chunk_sections(
    text: &str,
    sections: &[ParsedSection],
    config: &ChunkingConfig,
) -> Vec<SectionChunk> {
    let sentences = split_sentences(text);
    let mut chunks: Vec<SectionChunk> = Vec::new();
    // Body start of every emitted chunk, for overlap computation
    let mut body_starts: Vec<usize> = Vec::new();
    let mut pending: Option<PendingChunk> = None;

    for (s, e) in sentences {
        let sentence_tokens = count_tokens(&text[s..e]);
        if sentence_tokens == 0 {
            // Trailing whitespace span; extend whatever is open
            if let Some(p) = pending.as_mut() {
                p.body_end = e;
            }
            continue;
        }

        let owner = owning_section(sections, first_non_ws(text, s, e));

        match pending.as_mut() {
            None => {
                pending = Some(PendingChunk {
                    body_start: s,
                    body_end: e,
                    tokens: sentence_tokens,
                    section_id: owner.id,
                });
            }
            Some(p) => {
                let window_full = p.tokens + sentence_tokens > config.target_tokens;
                if p.section_id != owner.id || window_full {
                    let done = pending.take().unwrap();
                    emit(text, sections, config, done, &mut chunks, &mut body_starts);
                    pending = Some(PendingChunk {
                        body_start: s,
                        body_end: e,
                        tokens: sentence_tokens,
                        section_id: owner.id,
                    });
                } else {
                    p.body_end = e;
                    p.tokens += sentence_tokens;
                }
            }
        }
    }

    if let Some(done) = pending.take() {
        emit(text, sections, config, done, &mut chunks, &mut body_starts);
    }

    debug!(
        input_len = text.len(),
        chunk_count = chunks.len(),
        target_tokens = config.target_tokens,
        "Document chunked"
    );

    chunks
}

fn emit(
    text: &str,
    sections: &[ParsedSection],
    config: &ChunkingConfig,
    p: PendingChunk,
    chunks: &mut Vec<SectionChunk>,
    body_starts: &mut Vec<usize>,
) {
    // Overlap repeats the trailing tokens of the previous chunk's body,
    // clamped to what the body holds
    let (char_start, overlap_start) = match chunks.last_mut() {
        Some(prev) if config.overlap_tokens > 0 => {
            let prev_body_start = body_starts[body_starts.len() - 1];
            let body = &text[prev_body_start..prev.char_end];
            let tokens = token_spans(body);
            let n = config.overlap_tokens.min(tokens.len());
            if n == 0 {
                (p.body_start, 0)
            } else {
                prev.overlap_tokens_end = n as i32;
                (prev_body_start + tokens[tokens.len() - n].0, n)
            }
        }
        _ => (p.body_start, 0),
    };

    let content = &text[char_start..p.body_end];

    chunks.push(SectionChunk {
        section_id: p.section_id,
        section_path: section_path(sections, p.section_id),
        chunk_index: chunks.len() as i32,
        content: content.to_string(),
        char_start,
        char_end: p.body_end,
        token_count: count_tokens(content) as i32,
        overlap_tokens_start: overlap_start as i32,
        overlap_tokens_end: 0,
    });
    body_starts.push(p.body_start);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::parse_structure;

    fn config(target: usize, overlap: usize) -> ChunkingConfig {
        ChunkingConfig {
            target_tokens: target,
            overlap_tokens: overlap,
        }
    }

    const CONTRACT: &str = "\
1. Definitions\n\
\"Client\" means the party identified in the signature block of this Agreement.\n\
2. Payment\n\
All invoices are due within thirty (30) days of receipt. Late payments accrue interest at one percent per month. The Client shall reimburse reasonable expenses.\n\
5. Termination\n\
Either party may terminate this Agreement upon sixty (60) days written notice. Termination does not relieve the Client of accrued payment obligations.\n";

    #[test]
    fn test_sentences_cover_text_without_gaps() {
        let spans = split_sentences(CONTRACT);
        assert!(!spans.is_empty());
        assert_eq!(spans[0].0, 0);
        for pair in spans.windows(2) {
            assert_eq!(pair[0].1, pair[1].0);
        }
        assert_eq!(spans.last().unwrap().1, CONTRACT.len());
    }

    #[test]
    fn test_abbreviations_do_not_end_sentences() {
        let text = "As held in Smith v. Jones, notice under Sec. 4 is required. A new sentence follows.";
        let spans = split_sentences(text);
        assert_eq!(spans.len(), 2);
        assert!(text[spans[0].0..spans[0].1].contains("Sec. 4"));
    }

    #[test]
    fn test_chunk_bodies_partition_the_text() {
        let outcome = parse_structure(CONTRACT);
        let chunks = chunk_sections(CONTRACT, &outcome.sections, &config(20, 5));
        assert!(chunks.len() >= 2);

        // Body of chunk i starts where chunk i-1 ends; overlap is the only
        // duplicated text
        let mut reconstructed = String::new();
        let mut prev_end = 0;
        for chunk in &chunks {
            assert!(chunk.char_start <= prev_end || prev_end == 0);
            reconstructed.push_str(&CONTRACT[prev_end.max(chunk.char_start)..chunk.char_end]);
            prev_end = chunk.char_end;
        }
        assert_eq!(reconstructed, CONTRACT);
    }

    #[test]
    fn test_chunking_is_idempotent() {
        let outcome = parse_structure(CONTRACT);
        let first = chunk_sections(CONTRACT, &outcome.sections, &config(20, 5));
        let second = chunk_sections(CONTRACT, &outcome.sections, &config(20, 5));
        assert_eq!(first, second);
    }

    #[test]
    fn test_chunks_never_mix_sections() {
        let outcome = parse_structure(CONTRACT);
        let chunks = chunk_sections(CONTRACT, &outcome.sections, &config(400, 0));
        let paths: Vec<&str> = chunks.iter().map(|c| c.section_path.as_str()).collect();
        assert!(paths.contains(&"1"));
        assert!(paths.contains(&"2"));
        assert!(paths.contains(&"5"));
        // Large window still does not merge across section boundaries
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn test_oversized_sentence_becomes_its_own_chunk() {
        let long = format!("{}end.", "word ".repeat(50));
        let text = format!("Short one. {} Tail sentence here.", long);
        let outcome = parse_structure(&text);
        let chunks = chunk_sections(&text, &outcome.sections, &config(10, 0));
        assert_eq!(chunks.len(), 3);
        assert!(chunks[1].token_count > 10);
    }

    #[test]
    fn test_overlap_marked_on_both_sides() {
        let outcome = parse_structure(CONTRACT);
        let chunks = chunk_sections(CONTRACT, &outcome.sections, &config(20, 5));
        assert!(chunks.len() >= 2);
        assert_eq!(chunks[0].overlap_tokens_start, 0);
        for pair in chunks.windows(2) {
            assert_eq!(pair[0].overlap_tokens_end, pair[1].overlap_tokens_start);
        }
        assert!(chunks[1].overlap_tokens_start > 0);
        assert!(chunks[1].overlap_tokens_start <= 5);
    }

    #[test]
    fn test_short_section_overlap_clamped() {
        let text = "1. First\nTwo words.\n2. Second\nAnother short sentence here.\n";
        let outcome = parse_structure(text);
        let chunks = chunk_sections(text, &outcome.sections, &config(400, 60));
        assert_eq!(chunks.len(), 2);
        // Previous body holds fewer tokens than the overlap window
        let prev_tokens = count_tokens(&text[chunks[0].char_start..chunks[0].char_end]);
        assert_eq!(chunks[1].overlap_tokens_start as usize, prev_tokens);
    }

    #[test]
    fn test_empty_text_produces_no_chunks() {
        let outcome = parse_structure("");
        assert!(chunk_sections("", &outcome.sections, &config(400, 60)).is_empty());
    }
}
