//! Answer service
//!
//! Ties the query-time pipeline together: preprocess, retrieve, aggregate,
//! conflict-check, generate, and map citations. Soft conditions ride along
//! as warnings; only a total retrieval outage fails the request.

use crate::aggregator::{aggregate, ContextBundle};
use crate::citations::{track_citations, TrackedCitation};
use crate::numeric::{check_conflicts, ConflictRecord};
use crate::orchestrator::RetrievalOrchestrator;
use crate::query::{process_query, QueryIntent};
use crate::store::RetrievalStore;
use clausetrace_common::config::{GeneratorConfig, RetrievalConfig};
use clausetrace_common::db::NewCitation;
use clausetrace_common::errors::{AppError, QualityWarning, Result};
use clausetrace_common::generator::{AnswerGenerator, GenerationContext, GenerationOptions};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument};
use uuid::Uuid;

/// Citation as returned to the caller
#[derive(Debug, Clone, Serialize)]
pub struct CitationView {
    pub marker_index: i32,
    pub chunk_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_path: Option<String>,
    pub answer_span_start: i32,
    pub answer_span_end: i32,
    pub resolved: bool,
}

/// Response of `answer_query`
#[derive(Debug, Serialize)]
pub struct QueryAnswer {
    pub answer_id: Uuid,
    pub answer_text: String,
    pub intent: QueryIntent,
    pub confidence: f32,
    pub citations: Vec<CitationView>,
    pub conflicts: Vec<ConflictRecord>,
    pub warnings: Vec<QualityWarning>,
}

/// One hit of the search-only operation
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultView {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub section_path: String,
    pub score: f32,
    pub snippet: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub highlights: Vec<String>,
}

/// Response of `search_documents`
#[derive(Debug, Serialize)]
pub struct SearchOutcome {
    pub results: Vec<SearchResultView>,
    pub intent: QueryIntent,
    pub warnings: Vec<QualityWarning>,
}

/// Query-time answer service
pub struct RetrievalService {
    orchestrator: RetrievalOrchestrator,
    store: Arc<dyn RetrievalStore>,
    generator: Arc<dyn AnswerGenerator>,
    retrieval: RetrievalConfig,
    generation: GeneratorConfig,
}

impl RetrievalService {
    pub fn new(
        orchestrator: RetrievalOrchestrator,
        store: Arc<dyn RetrievalStore>,
        generator: Arc<dyn AnswerGenerator>,
        retrieval: RetrievalConfig,
        generation: GeneratorConfig,
    ) -> Self {
        Self {
            orchestrator,
            store,
            generator,
            retrieval,
            generation,
        }
    }

    /// Answer a question against the given documents
    #[instrument(skip(self, question, conversation_history), fields(documents = document_ids.len()))]
    pub async fn answer_query(
        &self,
        question: &str,
        document_ids: &[Uuid],
        conversation_history: &[String],
    ) -> Result<QueryAnswer> {
        let started = Instant::now();
        let processed = process_query(question);

        let outcome = self.orchestrator.retrieve(&processed, document_ids).await?;
        if outcome.is_total_outage() {
            return Err(AppError::RetrievalFailed {
                message: "No retrieval signal reachable".to_string(),
            });
        }

        let mut warnings = outcome.warnings.clone();
        let bundle = aggregate(outcome.candidates, self.retrieval.token_budget);

        if bundle.is_empty() {
            clausetrace_common::metrics::record_retrieval(
                started.elapsed().as_secs_f64(),
                processed.intent.as_str(),
                0,
                warnings.len(),
            );
            return Ok(QueryAnswer {
                answer_id: Uuid::new_v4(),
                answer_text: "The available documents do not contain information relevant \
                    to this question."
                    .to_string(),
                intent: processed.intent,
                confidence: 0.0,
                citations: vec![],
                conflicts: vec![],
                warnings,
            });
        }

        let conflict_inputs: Vec<(Uuid, &str)> = bundle
            .entries
            .iter()
            .map(|e| (e.chunk.id, e.chunk.content.as_str()))
            .collect();
        let conflicts = check_conflicts(&conflict_inputs);
        clausetrace_common::metrics::record_conflicts(conflicts.len());

        let contexts: Vec<GenerationContext> = bundle
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| GenerationContext {
                position: i + 1,
                section_path: if entry.chunk.section_path.is_empty() {
                    "document".to_string()
                } else {
                    entry.chunk.section_path.clone()
                },
                content: entry.chunk.content.clone(),
            })
            .collect();

        let options = GenerationOptions {
            system_prompt: system_prompt(processed.intent, !conflicts.is_empty()),
            max_tokens: self.generation.max_tokens,
            temperature: self.generation.temperature,
        };
        let effective_question = with_history(question, conversation_history);
        let answer_text = self
            .generator
            .generate(&effective_question, &contexts, &options)
            .await?;

        let tracked = track_citations(&answer_text, &bundle.chunk_ids());
        let unresolved = tracked.iter().filter(|c| !c.resolved).count();
        for citation in tracked.iter().filter(|c| !c.resolved) {
            warnings.push(QualityWarning::CitationUnresolved {
                marker: citation.marker_index as usize,
            });
        }
        clausetrace_common::metrics::record_unresolved_citations(unresolved);

        let answer_id = Uuid::new_v4();
        self.store
            .save_citations(answer_id, tracked.iter().map(to_new_citation).collect())
            .await?;

        let confidence = confidence_score(&bundle, &tracked, &answer_text);
        let citations = citation_views(&tracked, &bundle);

        clausetrace_common::metrics::record_retrieval(
            started.elapsed().as_secs_f64(),
            processed.intent.as_str(),
            bundle.entries.len(),
            warnings.len(),
        );
        info!(
            answer_id = %answer_id,
            intent = processed.intent.as_str(),
            bundle_chunks = bundle.entries.len(),
            conflicts = conflicts.len(),
            unresolved_citations = unresolved,
            "Query answered"
        );

        Ok(QueryAnswer {
            answer_id,
            answer_text,
            intent: processed.intent,
            confidence,
            citations,
            conflicts,
            warnings,
        })
    }

    /// Hybrid search without generation, for the search endpoint
    pub async fn search_documents(
        &self,
        query: &str,
        document_ids: &[Uuid],
        limit: usize,
    ) -> Result<SearchOutcome> {
        let processed = process_query(query);
        let (hits, warnings) = self
            .orchestrator
            .search(&processed, document_ids, limit)
            .await?;

        let results = hits
            .into_iter()
            .map(|(hit, chunk)| SearchResultView {
                chunk_id: chunk.id,
                document_id: chunk.document_id,
                section_path: chunk.section_path.clone(),
                score: hit.score,
                snippet: snippet(&chunk.content),
                highlights: hit.highlights,
            })
            .collect();

        Ok(SearchOutcome {
            results,
            intent: processed.intent,
            warnings,
        })
    }
}

fn to_new_citation(citation: &TrackedCitation) -> NewCitation {
    NewCitation {
        marker_index: citation.marker_index,
        chunk_id: citation.chunk_id,
        answer_span_start: citation.answer_span_start,
        answer_span_end: citation.answer_span_end,
        resolved: citation.resolved,
    }
}

fn citation_views(tracked: &[TrackedCitation], bundle: &ContextBundle) -> Vec<CitationView> {
    tracked
        .iter()
        .map(|c| CitationView {
            marker_index: c.marker_index,
            chunk_id: c.chunk_id,
            section_path: c.chunk_id.and_then(|id| {
                bundle
                    .entries
                    .iter()
                    .find(|e| e.chunk.id == id)
                    .map(|e| e.chunk.section_path.clone())
            }),
            answer_span_start: c.answer_span_start,
            answer_span_end: c.answer_span_end,
            resolved: c.resolved,
        })
        .collect()
}

fn snippet(content: &str) -> String {
    if content.chars().count() <= 200 {
        content.to_string()
    } else {
        let cut: String = content.chars().take(200).collect();
        format!("{}...", cut.trim_end())
    }
}

fn with_history(question: &str, history: &[String]) -> String {
    if history.is_empty() {
        return question.to_string();
    }
    let recent: Vec<&str> = history
        .iter()
        .rev()
        .take(4)
        .rev()
        .map(String::as_str)
        .collect();
    format!(
        "Earlier conversation:\n{}\n\nCurrent question: {}",
        recent.join("\n"),
        question
    )
}

/// System prompt flavored by the detected intent
fn system_prompt(intent: QueryIntent, has_conflicts: bool) -> String {
    let base = "You are a legal assistant answering questions about the provided \
        document excerpts. Every claim must cite its excerpt with an inline [n] marker.";

    let focus = match intent {
        QueryIntent::Definition => {
            " Focus on the exact defined terms and where they are declared."
        }
        QueryIntent::Obligation => {
            " Focus on who must do what, under which conditions, and by when."
        }
        QueryIntent::Timeline => {
            " Focus on deadlines, time periods, and dates; be precise about timeframes."
        }
        QueryIntent::Party => " Focus on the parties involved and their roles.",
        QueryIntent::Termination => {
            " Focus on termination conditions, notice requirements, and procedure."
        }
        QueryIntent::Payment => {
            " Focus on payment amounts, schedules, and financial obligations."
        }
        QueryIntent::Liability => {
            " Focus on liability, indemnification, and risk allocation."
        }
        QueryIntent::General => " Answer comprehensively with precise citations.",
    };

    let mut prompt = format!("{}{}", base, focus);
    if has_conflicts {
        prompt.push_str(
            " The excerpts contain conflicting numeric terms; point out the \
            discrepancy explicitly.",
        );
    }
    prompt
}

/// Confidence from bundle relevance and citation coverage
fn confidence_score(
    bundle: &ContextBundle,
    citations: &[TrackedCitation],
    answer: &str,
) -> f32 {
    let mut confidence: f32 = 0.5;

    let avg_score: f32 =
        bundle.entries.iter().map(|e| e.score).sum::<f32>() / bundle.entries.len().max(1) as f32;
    confidence += avg_score.min(0.3);

    if !citations.is_empty() {
        let resolved = citations.iter().filter(|c| c.resolved).count() as f32;
        confidence += 0.1 * (resolved / citations.len() as f32);
    }

    if answer.len() > 100 {
        confidence += 0.1;
    }

    confidence.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_flavored_by_intent() {
        let p = system_prompt(QueryIntent::Termination, false);
        assert!(p.contains("termination conditions"));
        assert!(p.contains("[n]"));
    }

    #[test]
    fn test_system_prompt_mentions_conflicts_when_present() {
        let p = system_prompt(QueryIntent::General, true);
        assert!(p.contains("conflicting numeric terms"));
        assert!(!system_prompt(QueryIntent::General, false).contains("conflicting"));
    }

    #[test]
    fn test_history_folded_into_question() {
        let q = with_history(
            "And the renewal term?",
            &["What is the notice period?".to_string(), "Thirty days.".to_string()],
        );
        assert!(q.contains("Earlier conversation:"));
        assert!(q.contains("Current question: And the renewal term?"));
        assert_eq!(with_history("Plain?", &[]), "Plain?");
    }

    #[test]
    fn test_unresolved_citations_lower_confidence_contribution() {
        let bundle = ContextBundle {
            entries: vec![],
            total_tokens: 0,
        };
        let resolved = TrackedCitation {
            marker_index: 1,
            chunk_id: Some(Uuid::new_v4()),
            answer_span_start: 0,
            answer_span_end: 3,
            resolved: true,
        };
        let unresolved = TrackedCitation {
            chunk_id: None,
            resolved: false,
            ..resolved.clone()
        };

        let full = confidence_score(&bundle, &[resolved.clone(), resolved.clone()], "short");
        let half = confidence_score(&bundle, &[resolved, unresolved], "short");
        assert!(full > half);
    }

    #[test]
    fn test_snippet_truncates_long_content() {
        let long = "word ".repeat(100);
        let s = snippet(&long);
        assert!(s.ends_with("..."));
        assert!(s.chars().count() <= 203);
    }
}
