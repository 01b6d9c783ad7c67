//! Structure parser
//!
//! Builds a section tree from a document's extracted text by scanning for
//! heading-like lines: decimal-numbered headings ("5.2 Termination"),
//! explicit Section/Article markers, and short all-caps lines. A synthetic
//! root section always spans the whole text and owns anything no heading
//! claims; a document with no detectable headings is not an error.
//!
//! All offsets are byte offsets into the source text.

use regex_lite::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

/// A parsed section, document order, root first
#[derive(Debug, Clone)]
pub struct ParsedSection {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,

    /// Numbering label as written ("5.2"); empty for the synthetic root,
    /// the heading text for unnumbered all-caps headings
    pub label: String,

    pub title: String,

    /// Synthetic root is depth 0; top-level headings depth 1
    pub depth: i32,

    pub char_start: usize,
    pub char_end: usize,
}

impl ParsedSection {
    pub fn contains(&self, offset: usize) -> bool {
        offset >= self.char_start && offset < self.char_end
    }
}

/// Result of structure parsing
#[derive(Debug, Clone)]
pub struct StructureOutcome {
    /// Sections in document order; index 0 is always the synthetic root
    pub sections: Vec<ParsedSection>,

    /// True when no headings were detected and only the root exists
    pub synthetic_root_only: bool,
}

fn decimal_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+(?:\.\d+)*)[.)]?\s+(\S.*)$").unwrap())
}

fn marker_heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"^(?:SECTION|Section|SEC\.|Sec\.|ARTICLE|Article|ART\.|Art\.)\s+(\d+(?:\.\d+)*)\.?\s*[:.\-]?\s*(.*)$",
        )
        .unwrap()
    })
}

#[derive(Debug)]
struct HeadingMatch {
    offset: usize,
    label: String,
    title: String,
    depth: i32,
}

/// Classify one line as a heading, if it is one
fn match_heading(line: &str) -> Option<(String, String, i32)> {
    let trimmed = line.trim_end();

    if let Some(caps) = marker_heading_re().captures(trimmed) {
        let label = caps[1].to_string();
        let title = caps.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let depth = label.matches('.').count() as i32 + 1;
        return Some((label.clone(), if title.is_empty() { label } else { title.to_string() }, depth));
    }

    if let Some(caps) = decimal_heading_re().captures(trimmed) {
        let title = caps[2].trim();
        // Require a heading-cased title so numbered list prose is not
        // mistaken for a heading
        if title.starts_with(|c: char| c.is_ascii_uppercase() || c == '"') {
            let label = caps[1].to_string();
            let depth = label.matches('.').count() as i32 + 1;
            return Some((label, title.to_string(), depth));
        }
    }

    if is_all_caps_heading(trimmed) {
        return Some((trimmed.to_string(), trimmed.to_string(), 1));
    }

    None
}

fn is_all_caps_heading(line: &str) -> bool {
    let len = line.chars().count();
    if !(3..=60).contains(&len) || line.ends_with('.') {
        return false;
    }
    let alpha: Vec<char> = line.chars().filter(|c| c.is_alphabetic()).collect();
    alpha.len() >= 3 && alpha.iter().all(|c| c.is_uppercase())
}

/// Parse the section tree out of extracted text
pub fn parse_structure(text: &str) -> StructureOutcome {
    let root_id = Uuid::new_v4();
    let root = ParsedSection {
        id: root_id,
        parent_id: None,
        label: String::new(),
        title: "Document".to_string(),
        depth: 0,
        char_start: 0,
        char_end: text.len(),
    };

    let mut headings: Vec<HeadingMatch> = Vec::new();
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        if let Some((label, title, depth)) = match_heading(content) {
            headings.push(HeadingMatch {
                offset,
                label,
                title,
                depth,
            });
        }
        offset += line.len();
    }

    if headings.is_empty() {
        return StructureOutcome {
            sections: vec![root],
            synthetic_root_only: true,
        };
    }

    let mut sections = vec![root];

    for (i, heading) in headings.iter().enumerate() {
        // A section ends where the next heading at its depth or above begins
        let char_end = headings[i + 1..]
            .iter()
            .find(|h| h.depth <= heading.depth)
            .map(|h| h.offset)
            .unwrap_or(text.len());

        // Parent is the most recently opened strictly-shallower section
        let parent_id = sections
            .iter()
            .rev()
            .find(|s| s.depth < heading.depth)
            .map(|s| s.id)
            .unwrap_or(root_id);

        sections.push(ParsedSection {
            id: Uuid::new_v4(),
            parent_id: Some(parent_id),
            label: heading.label.clone(),
            title: heading.title.clone(),
            depth: heading.depth,
            char_start: heading.offset,
            char_end,
        });
    }

    StructureOutcome {
        sections,
        synthetic_root_only: false,
    }
}

/// The deepest section containing the given offset
///
/// Falls back to the root, which spans the whole text.
pub fn owning_section<'a>(sections: &'a [ParsedSection], offset: usize) -> &'a ParsedSection {
    sections
        .iter()
        .filter(|s| s.contains(offset))
        .max_by_key(|s| s.depth)
        .unwrap_or(&sections[0])
}

/// Ordered labels from root to the given section, "/"-joined
///
/// The root's empty label is skipped, so a chunk under "5.2" gets "5/5.2".
pub fn section_path(sections: &[ParsedSection], section_id: Uuid) -> String {
    let mut labels = Vec::new();
    let mut current = sections.iter().find(|s| s.id == section_id);

    while let Some(section) = current {
        if !section.label.is_empty() {
            labels.push(section.label.clone());
        }
        current = section
            .parent_id
            .and_then(|pid| sections.iter().find(|s| s.id == pid));
    }

    labels.reverse();
    labels.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTRACT: &str = "\
1. Definitions\n\
\"Client\" means the party identified in the signature block.\n\
2. Payment\nInvoices are due within 30 days.\n\
5. Termination\nGeneral termination provisions.\n\
5.2 Termination for Convenience\n\
Either party may terminate upon thirty (30) days written notice to the Client.\n";

    #[test]
    fn test_parses_nested_sections() {
        let outcome = parse_structure(CONTRACT);
        assert!(!outcome.synthetic_root_only);

        let labels: Vec<&str> = outcome.sections.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["", "1", "2", "5", "5.2"]);

        let sub = outcome.sections.iter().find(|s| s.label == "5.2").unwrap();
        let parent = outcome.sections.iter().find(|s| s.label == "5").unwrap();
        assert_eq!(sub.parent_id, Some(parent.id));
        assert_eq!(sub.depth, 2);
    }

    #[test]
    fn test_section_spans_nest() {
        let outcome = parse_structure(CONTRACT);
        let parent = outcome.sections.iter().find(|s| s.label == "5").unwrap();
        let sub = outcome.sections.iter().find(|s| s.label == "5.2").unwrap();
        assert!(parent.char_start < sub.char_start);
        assert_eq!(parent.char_end, CONTRACT.len());
        assert_eq!(sub.char_end, CONTRACT.len());
    }

    #[test]
    fn test_owning_section_prefers_deepest() {
        let outcome = parse_structure(CONTRACT);
        let sub = outcome.sections.iter().find(|s| s.label == "5.2").unwrap();
        let owner = owning_section(&outcome.sections, sub.char_start + 10);
        assert_eq!(owner.label, "5.2");
    }

    #[test]
    fn test_section_path_joins_labels() {
        let outcome = parse_structure(CONTRACT);
        let sub = outcome.sections.iter().find(|s| s.label == "5.2").unwrap();
        assert_eq!(section_path(&outcome.sections, sub.id), "5/5.2");
    }

    #[test]
    fn test_no_headings_yields_synthetic_root() {
        let text = "plain prose without any heading structure at all.";
        let outcome = parse_structure(text);
        assert!(outcome.synthetic_root_only);
        assert_eq!(outcome.sections.len(), 1);
        assert_eq!(outcome.sections[0].char_end, text.len());
        assert_eq!(owning_section(&outcome.sections, 10).depth, 0);
    }

    #[test]
    fn test_marker_headings() {
        let text = "Section 3. Confidentiality\nEach party shall protect the other's data.\n";
        let outcome = parse_structure(text);
        let section = outcome.sections.iter().find(|s| s.label == "3").unwrap();
        assert_eq!(section.title, "Confidentiality");
    }

    #[test]
    fn test_all_caps_heading() {
        let text = "RECITALS\nWhereas the parties wish to cooperate.\n";
        let outcome = parse_structure(text);
        assert_eq!(outcome.sections.len(), 2);
        assert_eq!(outcome.sections[1].title, "RECITALS");
    }

    #[test]
    fn test_numbered_prose_is_not_a_heading() {
        let text = "The fee is due.\n30 days after the invoice date payment is owed.\n";
        let outcome = parse_structure(text);
        assert!(outcome.synthetic_root_only);
    }
}
