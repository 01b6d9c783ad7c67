//! Cross-reference extractor and resolver
//!
//! Finds explicit in-document references ("Section 5.2", "clause (a)
//! above", "as defined in Section 2") and records them against the chunk
//! whose body contains the reference text. Resolution maps the literal
//! label to matching sections and then to the chunk covering each
//! section's start; a label that matches nothing resolves to an empty
//! target set, which is a dangling reference, not an error.

use clausetrace_common::db::models::ReferenceKind;
use crate::structure::ParsedSection;
use regex_lite::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// Chunk span view used for offset containment
#[derive(Debug, Clone, Copy)]
pub struct ChunkSpan {
    pub id: Uuid,
    pub char_start: usize,
    pub char_end: usize,
}

/// A reference found in the text, unresolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedReference {
    pub source_chunk_id: Uuid,

    /// Target label as written ("5.2", "(a)")
    pub target_label: String,

    pub kind: ReferenceKind,

    pub char_start: usize,
}

fn section_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:Section|Sections|Sec\.|Article|Articles|Art\.|Clause)\s+(\d+(?:\.\d+)*)")
            .unwrap()
    })
}

fn clause_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"clause\s+(\([a-z]\))\s+above").unwrap())
}

/// Classify a reference by the phrasing right before it
fn classify(text: &str, match_start: usize) -> ReferenceKind {
    let window_start = match_start.saturating_sub(40);
    let window = text[window_start..match_start].to_lowercase();

    if window.contains("as defined in") || window.ends_with("defined in ") {
        ReferenceKind::DefinedTerm
    } else if window.contains("notwithstanding") {
        ReferenceKind::Override
    } else {
        ReferenceKind::SeeAlso
    }
}

/// The chunk whose body (content minus leading overlap) contains an offset
///
/// Body start of chunk i is chunk i-1's end, so overlapped text is
/// attributed once.
pub fn owning_chunk(spans: &[ChunkSpan], offset: usize) -> Option<Uuid> {
    let mut body_start = spans.first()?.char_start;
    for span in spans {
        if offset >= body_start && offset < span.char_end {
            return Some(span.id);
        }
        body_start = span.char_end;
    }
    None
}

/// Extract all unresolved references from a document's text
///
/// `spans` must be in chunk-index order.
pub fn extract_references(text: &str, spans: &[ChunkSpan]) -> Vec<ExtractedReference> {
    let mut references = Vec::new();

    for re in [section_ref_re(), clause_ref_re()] {
        for caps in re.captures_iter(text) {
            let label_match = match caps.get(1) {
                Some(m) => m,
                None => continue,
            };
            let char_start = label_match.start();
            let source_chunk_id = match owning_chunk(spans, char_start) {
                Some(id) => id,
                None => continue,
            };

            references.push(ExtractedReference {
                source_chunk_id,
                target_label: label_match.as_str().to_string(),
                kind: classify(text, caps.get(0).map(|m| m.start()).unwrap_or(char_start)),
                char_start,
            });
        }
    }

    references.sort_by_key(|r| r.char_start);
    references
}

/// Resolve a target label to chunk ids
///
/// Pure given a fixed section and chunk set: resolving twice yields the
/// same targets. Returns chunk ids covering the start of every section
/// whose label matches; empty when nothing matches.
pub fn resolve_label(
    label: &str,
    sections: &[ParsedSection],
    spans: &[ChunkSpan],
) -> Vec<Uuid> {
    let mut targets = Vec::new();

    for section in sections.iter().filter(|s| s.label == label) {
        if let Some(chunk_id) = owning_chunk(spans, section.char_start) {
            if !targets.contains(&chunk_id) {
                targets.push(chunk_id);
            }
        }
    }

    targets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::chunk_sections;
    use crate::structure::parse_structure;
    use clausetrace_common::config::ChunkingConfig;

    const CONTRACT: &str = "\
2. Definitions\n\
\"Client\" means the party identified in the signature block.\n\
5. Termination\n\
Subject to Section 2, either party may terminate this Agreement. \
Notwithstanding Section 5.2, cure periods still apply. \
The term Client is used as defined in Section 2.\n\
5.2 Termination for Convenience\n\
Termination under clause (a) above requires notice.\n";

    fn setup() -> (Vec<ParsedSection>, Vec<ChunkSpan>) {
        let sections = parse_structure(CONTRACT).sections;
        let config = ChunkingConfig {
            target_tokens: 400,
            overlap_tokens: 0,
        };
        let spans: Vec<ChunkSpan> = chunk_sections(CONTRACT, &sections, &config)
            .iter()
            .map(|c| ChunkSpan {
                id: Uuid::new_v4(),
                char_start: c.char_start,
                char_end: c.char_end,
            })
            .collect();
        (sections, spans)
    }

    #[test]
    fn test_extracts_references_with_kinds() {
        let (_, spans) = setup();
        let refs = extract_references(CONTRACT, &spans);

        let labels: Vec<(&str, ReferenceKind)> = refs
            .iter()
            .map(|r| (r.target_label.as_str(), r.kind))
            .collect();
        assert!(labels.contains(&("2", ReferenceKind::SeeAlso)));
        assert!(labels.contains(&("5.2", ReferenceKind::Override)));
        assert!(labels.contains(&("2", ReferenceKind::DefinedTerm)));
        assert!(labels.contains(&("(a)", ReferenceKind::SeeAlso)));
    }

    #[test]
    fn test_references_attributed_to_containing_chunk() {
        let (_, spans) = setup();
        let refs = extract_references(CONTRACT, &spans);

        // All Section references in this text live in section 5's chunk
        let section_two_ref = refs.iter().find(|r| r.target_label == "2").unwrap();
        let owner = owning_chunk(&spans, section_two_ref.char_start).unwrap();
        assert_eq!(section_two_ref.source_chunk_id, owner);
    }

    #[test]
    fn test_resolution_maps_label_to_covering_chunk() {
        let (sections, spans) = setup();
        let targets = resolve_label("2", &sections, &spans);
        assert_eq!(targets.len(), 1);

        let section_two = sections.iter().find(|s| s.label == "2").unwrap();
        assert_eq!(
            targets[0],
            owning_chunk(&spans, section_two.char_start).unwrap()
        );
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let (sections, spans) = setup();
        let first = resolve_label("5.2", &sections, &spans);
        let second = resolve_label("5.2", &sections, &spans);
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_dangling_label_resolves_empty() {
        let (sections, spans) = setup();
        assert!(resolve_label("99", &sections, &spans).is_empty());
        assert!(resolve_label("(a)", &sections, &spans).is_empty());
    }
}
