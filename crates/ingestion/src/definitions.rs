//! Definition extractor
//!
//! Scans section text for defined-term declarations ("X" means, X shall
//! mean, For purposes of this Agreement "X" ...) and builds the per-document
//! term catalog. Conflicting declarations of the same normalized term are
//! all kept and flagged ambiguous; lookups decide what to do with them.

use crate::chunker::split_sentences;
use crate::structure::{owning_section, section_path, ParsedSection};
use regex_lite::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

/// A defined-term declaration found in the text
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedDefinition {
    /// Term as written, original casing
    pub term_display: String,

    /// Normalized lookup key
    pub term_key: String,

    /// The full defining sentence
    pub definition_text: String,

    /// Byte offset of the term in the source text
    pub char_start: usize,

    /// Path of the section the declaration appears in
    pub scope_section_path: Option<String>,

    /// True when the document declares the same key more than once
    pub ambiguous: bool,
}

fn quoted_term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"["“”]([^"“”]{1,80})["“”]\s+(?:shall\s+mean|means)\b"#).unwrap()
    })
}

fn caps_term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z]{2,}(?:\s+[A-Z]{2,})*)\s+(?:shall\s+mean|means)\b").unwrap()
    })
}

fn title_term_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // "shall mean" only; bare "means" after an unquoted TitleCase word is
    // too often ordinary prose
    RE.get_or_init(|| {
        Regex::new(r"\b([A-Z][a-z]+(?:\s+[A-Z][a-z]+){0,4})\s+shall\s+mean\b").unwrap()
    })
}

fn purposes_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"For (?:the )?purposes of this [^,]{1,60},\s*["“]([^"“”]{1,80})["”]"#).unwrap()
    })
}

/// Normalize a term into its lookup key
///
/// Lowercases, strips a leading article and trailing punctuation, and trims
/// a plural "s" when the stem stays at least four characters. All-caps
/// terms are treated as acronyms and keep their trailing "s".
pub fn normalize_term(term: &str) -> String {
    let trimmed = term
        .trim()
        .trim_matches(|c: char| c == '"' || c == '“' || c == '”')
        .trim_end_matches(|c: char| c.is_ascii_punctuation());

    let is_acronym = trimmed.chars().filter(|c| c.is_alphabetic()).count() >= 2
        && trimmed
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase());

    let mut key = trimmed.to_lowercase();

    for article in ["the ", "a ", "an "] {
        if let Some(rest) = key.strip_prefix(article) {
            key = rest.to_string();
            break;
        }
    }

    if !is_acronym && key.ends_with('s') && !key.ends_with("ss") && key.len() > 4 {
        key.truncate(key.len() - 1);
    }

    key
}

/// Extract the definition catalog from a document's text
pub fn extract_definitions(
    text: &str,
    sections: &[ParsedSection],
) -> Vec<ExtractedDefinition> {
    let mut definitions: Vec<ExtractedDefinition> = Vec::new();

    for (start, end) in split_sentences(text) {
        let sentence = &text[start..end];

        for re in [quoted_term_re(), caps_term_re(), title_term_re(), purposes_re()] {
            for caps in re.captures_iter(sentence) {
                let term_match = match caps.get(1) {
                    Some(m) => m,
                    None => continue,
                };
                let term_display = term_match.as_str().trim().to_string();
                let term_key = normalize_term(&term_display);
                if term_key.is_empty() {
                    continue;
                }

                let char_start = start + term_match.start();

                // The same declaration can match more than one pattern
                if definitions
                    .iter()
                    .any(|d| d.char_start == char_start && d.term_key == term_key)
                {
                    continue;
                }

                let owner = owning_section(sections, char_start);
                let path = section_path(sections, owner.id);

                // A heading with no terminal punctuation runs into the
                // defining sentence; cut the sentence at the term's line
                let line_start = sentence[..term_match.start()]
                    .rfind('\n')
                    .map(|i| i + 1)
                    .unwrap_or(0);

                definitions.push(ExtractedDefinition {
                    term_display,
                    term_key,
                    definition_text: sentence[line_start..].trim().to_string(),
                    char_start,
                    scope_section_path: if path.is_empty() { None } else { Some(path) },
                    ambiguous: false,
                });
            }
        }
    }

    flag_ambiguous(&mut definitions);
    definitions
}

/// Mark every declaration whose key appears more than once
fn flag_ambiguous(definitions: &mut [ExtractedDefinition]) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for def in definitions.iter() {
        *counts.entry(def.term_key.as_str()).or_default() += 1;
    }
    let ambiguous_keys: Vec<String> = counts
        .into_iter()
        .filter(|(_, n)| *n > 1)
        .map(|(k, _)| k.to_string())
        .collect();

    for def in definitions.iter_mut() {
        if ambiguous_keys.iter().any(|k| k == &def.term_key) {
            def.ambiguous = true;
        }
    }
}
