//! Query preprocessing
//!
//! Cleans the question, detects its legal intent, and extracts keywords.
//! The intent selects the generator's system-prompt flavor and is echoed
//! in the response; keywords feed the keyword signal. The stop-word list
//! deliberately keeps modal verbs ("shall", "must", "may") because they
//! carry obligation semantics in contract language.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Legal intent of a query
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    General,
    Definition,
    Obligation,
    Timeline,
    Party,
    Termination,
    Payment,
    Liability,
}

impl QueryIntent {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryIntent::General => "general",
            QueryIntent::Definition => "definition",
            QueryIntent::Obligation => "obligation",
            QueryIntent::Timeline => "timeline",
            QueryIntent::Party => "party",
            QueryIntent::Termination => "termination",
            QueryIntent::Payment => "payment",
            QueryIntent::Liability => "liability",
        }
    }
}

/// A query after preprocessing
#[derive(Debug, Clone)]
pub struct ProcessedQuery {
    pub original: String,

    /// Cleaned, lowercased text sent to the search signals
    pub normalized: String,

    pub intent: QueryIntent,

    pub keywords: Vec<String>,
}

fn intent_patterns() -> &'static Vec<(QueryIntent, Vec<Regex>)> {
    static PATTERNS: OnceLock<Vec<(QueryIntent, Vec<Regex>)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let compile = |patterns: &[&str]| -> Vec<Regex> {
            patterns
                .iter()
                .map(|p| Regex::new(p).unwrap())
                .collect()
        };
        vec![
            (
                QueryIntent::Definition,
                compile(&[
                    r"what\s+(?:is|are|does|means?)\s+",
                    r"\bdefine\s+",
                    r"definition\s+of\s+",
                    r"meaning\s+of\s+",
                ]),
            ),
            (
                QueryIntent::Termination,
                compile(&[
                    r"\b(?:terminat\w+|cancel\w+|expir\w+)",
                    r"how\s+(?:to|do\s+i)\s+(?:end|stop|cancel|terminate)",
                    r"grounds?\s+for\s+termination",
                ]),
            ),
            (
                QueryIntent::Timeline,
                compile(&[
                    r"\b(?:when|timeline|deadline|due\s+date)\b",
                    r"\bwithin\s+\d+",
                    r"how\s+long\s+",
                    r"\d+\s+days?\b",
                ]),
            ),
            (
                QueryIntent::Payment,
                compile(&[
                    r"\b(?:payment|fees?|cost|price|amount|invoice|bill)\b",
                    r"how\s+much\s+",
                    r"\b(?:money|dollars?)\b",
                ]),
            ),
            (
                QueryIntent::Liability,
                compile(&[
                    r"\b(?:liability|liable|damages?|indemnif\w+)\b",
                    r"who\s+(?:pays?|is\s+responsible)",
                ]),
            ),
            (
                QueryIntent::Party,
                compile(&[
                    r"\b(?:who\s+is|which\s+party)\b",
                    r"parties\s+(?:to|in)\s+",
                ]),
            ),
            (
                QueryIntent::Obligation,
                compile(&[
                    r"\b(?:must|shall|required?|obligat\w+|duty|responsible)\b",
                    r"what\s+(?:do|does)\s+\w+\s+(?:have\s+to|need\s+to)",
                    r"responsibilities\s+of\s+",
                ]),
            ),
        ]
    })
}

/// Stop words dropped from keyword extraction; modal verbs are kept
const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of",
    "with", "by", "is", "are", "was", "were", "be", "been", "being", "have",
    "has", "had", "do", "does", "did", "would", "could", "this", "that",
    "these", "those", "what", "when", "how", "who", "which", "where", "why",
    "my", "our", "your", "their", "its",
];

fn clean(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    let mut last_space = true;
    for ch in query.trim().chars() {
        if ch.is_whitespace() {
            if !last_space {
                out.push(' ');
            }
            last_space = true;
        } else {
            out.extend(ch.to_lowercase());
            last_space = false;
        }
    }
    out
}

fn detect_intent(normalized: &str) -> QueryIntent {
    let mut best = QueryIntent::General;
    let mut best_score = 0usize;

    for (intent, patterns) in intent_patterns() {
        let score: usize = patterns
            .iter()
            .map(|re| re.find_iter(normalized).count())
            .sum();
        if score > best_score {
            best_score = score;
            best = *intent;
        }
    }

    best
}

fn extract_keywords(normalized: &str) -> Vec<String> {
    normalized
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w))
        .map(|w| w.to_string())
        .collect()
}

/// Preprocess a raw user question for retrieval
pub fn process_query(query: &str) -> ProcessedQuery {
    let normalized = clean(query);
    let intent = detect_intent(&normalized);
    let keywords = extract_keywords(&normalized);

    ProcessedQuery {
        original: query.to_string(),
        normalized,
        intent,
        keywords,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_intent() {
        let q = process_query("What does Confidential Information mean?");
        assert_eq!(q.intent, QueryIntent::Definition);
    }

    #[test]
    fn test_termination_intent() {
        let q = process_query("How do I terminate the agreement?");
        assert_eq!(q.intent, QueryIntent::Termination);
    }

    #[test]
    fn test_payment_intent() {
        let q = process_query("How much is the monthly fee?");
        assert_eq!(q.intent, QueryIntent::Payment);
    }

    #[test]
    fn test_no_match_is_general() {
        let q = process_query("Tell me about exhibit B");
        assert_eq!(q.intent, QueryIntent::General);
    }

    #[test]
    fn test_keywords_keep_modal_verbs() {
        let q = process_query("What notices shall the Client provide?");
        assert!(q.keywords.contains(&"shall".to_string()));
        assert!(q.keywords.contains(&"client".to_string()));
        assert!(!q.keywords.contains(&"the".to_string()));
        assert!(!q.keywords.contains(&"what".to_string()));
    }

    #[test]
    fn test_cleanup_collapses_whitespace_and_lowercases() {
        let q = process_query("  What   IS  a  Breach? ");
        assert_eq!(q.normalized, "what is a breach?");
        assert_eq!(q.original, "  What   IS  a  Breach? ");
    }
}
