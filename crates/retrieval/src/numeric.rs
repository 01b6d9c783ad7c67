//! Numerical consistency checker
//!
//! Scans bundle chunks for numeric quantities (durations, currency
//! amounts, explicit dates) tied to a nearby obligation stem. When two or
//! more chunks report different values for the same obligation and
//! dimension, one conflict record is emitted naming all of them. Conflicts
//! annotate the bundle; they never block the query.

use regex_lite::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use uuid::Uuid;

/// Unit dimension of an extracted quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    DurationDays,
    DurationMonths,
    DurationYears,
    Currency,
    Date,
}

/// One chunk's value inside a conflict
#[derive(Debug, Clone, Serialize)]
pub struct ConflictValue {
    pub chunk_id: Uuid,

    /// Normalized value ("30", "1500.00", "2024-01-15")
    pub value: String,

    /// Text as it appeared in the chunk
    pub raw: String,
}

/// Two or more chunks disagreeing on the same obligation and dimension
#[derive(Debug, Clone, Serialize)]
pub struct ConflictRecord {
    pub obligation_key: String,
    pub dimension: Dimension,
    pub values: Vec<ConflictValue>,
}

#[derive(Debug, Clone)]
struct Quantity {
    dimension: Dimension,
    value: String,
    raw: String,
    offset: usize,
}

/// Obligation stems matched by word prefix near the quantity, with the
/// canonical key they group under
const OBLIGATION_STEMS: &[(&str, &str)] = &[
    ("terminat", "terminate"),
    ("paid", "pay"),
    ("pay", "pay"),
    ("notic", "notice"),
    ("notif", "notice"),
    ("renew", "renew"),
    ("deliver", "deliver"),
    ("cure", "cure"),
    ("indemnif", "indemnify"),
];

/// Characters of surrounding text searched for an obligation stem
const OBLIGATION_WINDOW: usize = 120;

fn duration_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // Covers "thirty (30) days" (digits in parentheses) and plain "60 days"
    RE.get_or_init(|| {
        Regex::new(r"(?:\((\d{1,4})\)|\b(\d{1,4}))\s*(?:calendar\s+|business\s+)?(days?|months?|years?)\b")
            .unwrap()
    })
}

fn currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\$|USD\s?)([\d,]+(?:\.\d{2})?)").unwrap())
}

fn date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\b(January|February|March|April|May|June|July|August|September|October|November|December)\s+(\d{1,2}),\s+(\d{4})\b|\b(\d{4})-(\d{2})-(\d{2})\b",
        )
        .unwrap()
    })
}

fn month_number(name: &str) -> u32 {
    match name {
        "January" => 1,
        "February" => 2,
        "March" => 3,
        "April" => 4,
        "May" => 5,
        "June" => 6,
        "July" => 7,
        "August" => 8,
        "September" => 9,
        "October" => 10,
        "November" => 11,
        "December" => 12,
        _ => 0,
    }
}

fn extract_quantities(text: &str) -> Vec<Quantity> {
    let mut quantities = Vec::new();

    for caps in duration_re().captures_iter(text) {
        let m = caps.get(0).map(|m| (m.start(), m.as_str().to_string()));
        let value = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|v| v.as_str().to_string());
        let unit = caps.get(3).map(|u| u.as_str());
        if let (Some((offset, raw)), Some(value), Some(unit)) = (m, value, unit) {
            let dimension = if unit.starts_with("day") {
                Dimension::DurationDays
            } else if unit.starts_with("month") {
                Dimension::DurationMonths
            } else {
                Dimension::DurationYears
            };
            quantities.push(Quantity {
                dimension,
                value,
                raw,
                offset,
            });
        }
    }

    for caps in currency_re().captures_iter(text) {
        if let (Some(whole), Some(amount)) = (caps.get(0), caps.get(1)) {
            quantities.push(Quantity {
                dimension: Dimension::Currency,
                value: amount.as_str().replace(',', ""),
                raw: whole.as_str().to_string(),
                offset: whole.start(),
            });
        }
    }

    for caps in date_re().captures_iter(text) {
        let whole = match caps.get(0) {
            Some(m) => m,
            None => continue,
        };
        let value = if let (Some(month), Some(day), Some(year)) =
            (caps.get(1), caps.get(2), caps.get(3))
        {
            format!(
                "{}-{:02}-{:02}",
                year.as_str(),
                month_number(month.as_str()),
                day.as_str().parse::<u32>().unwrap_or(0)
            )
        } else if let (Some(year), Some(month), Some(day)) =
            (caps.get(4), caps.get(5), caps.get(6))
        {
            format!("{}-{}-{}", year.as_str(), month.as_str(), day.as_str())
        } else {
            continue;
        };
        quantities.push(Quantity {
            dimension: Dimension::Date,
            value,
            raw: whole.as_str().to_string(),
            offset: whole.start(),
        });
    }

    quantities
}

/// Nearest obligation stem within the window around an offset
fn obligation_key(text: &str, offset: usize) -> Option<&'static str> {
    let start = offset.saturating_sub(OBLIGATION_WINDOW);
    let end = (offset + OBLIGATION_WINDOW).min(text.len());
    // Clamp to char boundaries
    let start = (start..=offset).find(|&i| text.is_char_boundary(i))?;
    let end = (end..text.len())
        .find(|&i| text.is_char_boundary(i))
        .unwrap_or(text.len());

    let window = text[start..end].to_lowercase();
    for word in window.split(|c: char| !c.is_alphanumeric()) {
        for (stem, canonical) in OBLIGATION_STEMS {
            if word.starts_with(stem) {
                return Some(canonical);
            }
        }
    }
    None
}

/// Check bundle chunks for conflicting quantities
///
/// Emits one record per (obligation key, dimension) with two or more
/// distinct values across chunks.
pub fn check_conflicts(chunks: &[(Uuid, &str)]) -> Vec<ConflictRecord> {
    // BTreeMap keeps record order deterministic
    let mut grouped: BTreeMap<(&'static str, Dimension), Vec<ConflictValue>> = BTreeMap::new();

    for (chunk_id, text) in chunks {
        for quantity in extract_quantities(text) {
            let key = match obligation_key(text, quantity.offset) {
                Some(k) => k,
                None => continue,
            };
            grouped
                .entry((key, quantity.dimension))
                .or_default()
                .push(ConflictValue {
                    chunk_id: *chunk_id,
                    value: quantity.value,
                    raw: quantity.raw,
                });
        }
    }

    grouped
        .into_iter()
        .filter_map(|((key, dimension), values)| {
            let mut distinct: Vec<&str> = values.iter().map(|v| v.value.as_str()).collect();
            distinct.sort_unstable();
            distinct.dedup();
            if distinct.len() >= 2 {
                Some(ConflictRecord {
                    obligation_key: key.to_string(),
                    dimension,
                    values,
                })
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_termination_notice_conflict_flagged_once() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let chunks = vec![
            (a, "Either party may terminate upon thirty (30) days written notice."),
            (b, "Termination requires sixty (60) days notice to the other party."),
        ];

        let conflicts = check_conflicts(&chunks);
        assert_eq!(conflicts.len(), 1);

        let conflict = &conflicts[0];
        assert_eq!(conflict.obligation_key, "terminate");
        assert_eq!(conflict.dimension, Dimension::DurationDays);
        let values: Vec<&str> = conflict.values.iter().map(|v| v.value.as_str()).collect();
        assert!(values.contains(&"30"));
        assert!(values.contains(&"60"));
        let cited: Vec<Uuid> = conflict.values.iter().map(|v| v.chunk_id).collect();
        assert!(cited.contains(&a) && cited.contains(&b));
    }

    #[test]
    fn test_agreeing_values_are_not_a_conflict() {
        let chunks = vec![
            (Uuid::new_v4(), "Terminate with 30 days notice."),
            (Uuid::new_v4(), "Termination notice period is 30 days."),
        ];
        assert!(check_conflicts(&chunks).is_empty());
    }

    #[test]
    fn test_different_obligations_do_not_conflict() {
        let chunks = vec![
            (Uuid::new_v4(), "Invoices shall be paid within 30 days."),
            (Uuid::new_v4(), "Either party may terminate on 60 days notice."),
        ];
        assert!(check_conflicts(&chunks).is_empty());
    }

    #[test]
    fn test_currency_conflict() {
        let chunks = vec![
            (Uuid::new_v4(), "Client shall pay a monthly fee of $1,500."),
            (Uuid::new_v4(), "The monthly payment amount is USD 1800."),
        ];
        let conflicts = check_conflicts(&chunks);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].dimension, Dimension::Currency);
        assert_eq!(conflicts[0].obligation_key, "pay");
    }

    #[test]
    fn test_days_and_months_are_separate_dimensions() {
        let chunks = vec![
            (Uuid::new_v4(), "Terminate with 30 days notice."),
            (Uuid::new_v4(), "Termination takes effect after 2 months."),
        ];
        assert!(check_conflicts(&chunks).is_empty());
    }

    #[test]
    fn test_date_extraction_normalizes_formats() {
        let quantities = extract_quantities("Effective January 15, 2024 until 2025-03-01.");
        let dates: Vec<&str> = quantities
            .iter()
            .filter(|q| q.dimension == Dimension::Date)
            .map(|q| q.value.as_str())
            .collect();
        assert_eq!(dates, vec!["2024-01-15", "2025-03-01"]);
    }

    #[test]
    fn test_quantity_without_nearby_obligation_is_ignored() {
        let chunks = vec![
            (Uuid::new_v4(), "The building is 30 days old."),
            (Uuid::new_v4(), "It took 60 days to construct."),
        ];
        assert!(check_conflicts(&chunks).is_empty());
    }
}
