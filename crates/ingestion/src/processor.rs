//! Ingestion processor
//!
//! Runs the per-document pipeline: structure parsing, definition and
//! cross-reference extraction, chunking, and index writes, advancing the
//! document's status through the lifecycle state machine at each stage.
//! This processor is the single writer of document status.
//!
//! At most one run per document is active at a time; a duplicate request
//! while a run is in flight is a conflict, not a second run. A document
//! stranded at a non-terminal status with no run in flight (the previous
//! run was dropped or the process died) is rewound to `pending` and
//! restarted.

use crate::chunker::chunk_sections;
use crate::definitions::extract_definitions;
use crate::errors::IngestionError;
use crate::indexing::{IndexableChunk, IndexingGateway};
use crate::references::{extract_references, owning_chunk, resolve_label, ChunkSpan};
use crate::structure::parse_structure;
use clausetrace_common::config::ChunkingConfig;
use clausetrace_common::db::models::ProcessingStatus;
use clausetrace_common::db::{
    NewChunk, NewCrossReference, NewDefinition, NewSection, Repository,
};
use clausetrace_common::errors::{AppError, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Outcome of a processing run
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingResult {
    pub status: ProcessingStatus,
    pub chunk_count: i32,
    pub error: Option<String>,
}

/// Status snapshot for polling callers
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingStatusView {
    pub status: ProcessingStatus,
    pub step_description: String,
}

/// Removes the document from the in-flight set when the run ends
///
/// Owns its handle on the set so it can travel into a spawned task.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<Uuid>>>,
    id: Uuid,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.id);
        }
    }
}

/// Outcome of admitting a document for processing
enum Admission {
    /// Terminal status; the stored result stands
    Done(ProcessingResult),

    /// Slot reserved; the caller runs the pipeline
    Run {
        guard: InFlightGuard,
        extracted_text: Option<String>,
    },
}

/// Ingestion processor
pub struct IngestionProcessor {
    repository: Repository,
    gateway: IndexingGateway,
    chunking: ChunkingConfig,
    in_flight: Arc<Mutex<HashSet<Uuid>>>,
}

impl IngestionProcessor {
    pub fn new(
        repository: Repository,
        gateway: IndexingGateway,
        chunking: ChunkingConfig,
    ) -> Self {
        Self {
            repository,
            gateway,
            chunking,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Check the document and reserve its processing slot
    async fn admit(&self, document_id: Uuid) -> Result<Admission> {
        let document = self
            .repository
            .find_document_by_id(document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let status = document.processing_status();
        if status.is_terminal() {
            info!(status = ?status, "Document already processed, returning existing result");
            return Ok(Admission::Done(ProcessingResult {
                status,
                chunk_count: document.chunk_count,
                error: document.error_message,
            }));
        }

        let guard = {
            let mut set = self
                .in_flight
                .lock()
                .map_err(|_| AppError::Internal {
                    message: "In-flight set poisoned".to_string(),
                })?;
            if !set.insert(document_id) {
                return Err(AppError::ProcessingInProgress {
                    document_id: document_id.to_string(),
                });
            }
            InFlightGuard {
                set: Arc::clone(&self.in_flight),
                id: document_id,
            }
        };

        // Non-pending with no run in flight means the previous run was
        // abandoned mid-stage; rewind and start over
        if status != ProcessingStatus::Pending {
            warn!(
                document_id = %document_id,
                status = ?status,
                "Recovering abandoned processing run"
            );
            self.repository
                .transition_document_status(document_id, ProcessingStatus::Pending, None, None)
                .await?;
        }

        Ok(Admission::Run {
            guard,
            extracted_text: document.extracted_text,
        })
    }

    /// Process a document end to end, inline
    ///
    /// Idempotent: a document already `ready` (or `failed`) returns its
    /// existing result without re-running the pipeline. The gateway uses
    /// [`Self::start_processing`] instead; this entry point serves the
    /// reprocessing binary.
    #[instrument(skip(self), fields(document_id = %document_id))]
    pub async fn process_document(&self, document_id: Uuid) -> Result<ProcessingResult> {
        match self.admit(document_id).await? {
            Admission::Done(result) => Ok(result),
            Admission::Run {
                guard,
                extracted_text,
            } => self.run(document_id, extracted_text, guard).await,
        }
    }

    /// Admit the document and run the pipeline as a background task
    ///
    /// Returns as soon as the run is admitted; callers poll
    /// [`Self::get_processing_status`] for progress. A duplicate request
    /// while a run is in flight is a conflict.
    pub async fn start_processing(self: Arc<Self>, document_id: Uuid) -> Result<ProcessingStatusView> {
        match self.admit(document_id).await? {
            Admission::Done(result) => Ok(ProcessingStatusView {
                status: result.status,
                step_description: result.status.step_description().to_string(),
            }),
            Admission::Run {
                guard,
                extracted_text,
            } => {
                let processor = Arc::clone(&self);
                tokio::spawn(async move {
                    if let Err(e) = processor.run(document_id, extracted_text, guard).await {
                        error!(
                            document_id = %document_id,
                            error = %e,
                            "Background processing run failed"
                        );
                    }
                });
                Ok(ProcessingStatusView {
                    status: ProcessingStatus::Pending,
                    step_description: ProcessingStatus::Pending.step_description().to_string(),
                })
            }
        }
    }

    /// Run the pipeline while holding the in-flight slot
    async fn run(
        &self,
        document_id: Uuid,
        extracted_text: Option<String>,
        guard: InFlightGuard,
    ) -> Result<ProcessingResult> {
        let _guard = guard;
        let started = std::time::Instant::now();
        match self.run_pipeline(document_id, extracted_text).await {
            Ok(chunk_count) => {
                clausetrace_common::metrics::record_processing(
                    started.elapsed().as_secs_f64(),
                    chunk_count as usize,
                    "ready",
                );
                Ok(ProcessingResult {
                    status: ProcessingStatus::Ready,
                    chunk_count,
                    error: None,
                })
            }
            Err(e) => {
                let message = e.to_string();
                let stage = e.failed_stage().to_string();
                warn!(error = %message, stage = %stage, "Document processing failed");

                self.repository
                    .transition_document_status(
                        document_id,
                        ProcessingStatus::Failed,
                        Some(message.clone()),
                        Some(stage),
                    )
                    .await?;

                clausetrace_common::metrics::record_processing(
                    started.elapsed().as_secs_f64(),
                    0,
                    "failed",
                );

                Ok(ProcessingResult {
                    status: ProcessingStatus::Failed,
                    chunk_count: 0,
                    error: Some(message),
                })
            }
        }
    }

    async fn run_pipeline(
        &self,
        document_id: Uuid,
        extracted_text: Option<String>,
    ) -> std::result::Result<i32, IngestionError> {
        // Stage: extracting (the text itself comes from an upstream
        // collaborator; this stage validates it is usable)
        self.repository
            .transition_document_status(document_id, ProcessingStatus::Extracting, None, None)
            .await?;

        let text = extracted_text
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| IngestionError::Extraction {
                source: AppError::ExtractionUnavailable {
                    document_id: document_id.to_string(),
                },
            })?;

        // Stage: chunking (structure, definitions, references, chunks)
        self.repository
            .transition_document_status(document_id, ProcessingStatus::Chunking, None, None)
            .await?;

        // A recovered run may have rows left over from the aborted attempt
        self.repository
            .clear_document_artifacts(document_id)
            .await
            .map_err(|source| IngestionError::Chunking { source })?;

        let outcome = parse_structure(&text);
        if outcome.synthetic_root_only {
            warn!(document_id = %document_id, "No headings detected, using synthetic root");
        }

        let sections: Vec<NewSection> = outcome
            .sections
            .iter()
            .map(|s| NewSection {
                id: s.id,
                parent_id: s.parent_id,
                label: s.label.clone(),
                title: s.title.clone(),
                depth: s.depth,
                char_start: s.char_start as i32,
                char_end: s.char_end as i32,
            })
            .collect();
        self.repository
            .insert_sections(document_id, sections)
            .await
            .map_err(|source| IngestionError::Chunking { source })?;

        let section_chunks = chunk_sections(&text, &outcome.sections, &self.chunking);
        let new_chunks: Vec<NewChunk> = section_chunks
            .iter()
            .map(|c| NewChunk {
                id: Uuid::new_v4(),
                section_id: c.section_id,
                section_path: c.section_path.clone(),
                chunk_index: c.chunk_index,
                content: c.content.clone(),
                token_count: c.token_count,
                char_start: c.char_start as i32,
                char_end: c.char_end as i32,
                overlap_tokens_start: c.overlap_tokens_start,
                overlap_tokens_end: c.overlap_tokens_end,
            })
            .collect();

        let spans: Vec<ChunkSpan> = new_chunks
            .iter()
            .map(|c| ChunkSpan {
                id: c.id,
                char_start: c.char_start as usize,
                char_end: c.char_end as usize,
            })
            .collect();

        let definitions: Vec<NewDefinition> = extract_definitions(&text, &outcome.sections)
            .into_iter()
            .map(|d| {
                if d.ambiguous {
                    warn!(
                        document_id = %document_id,
                        term = %d.term_display,
                        "Ambiguous defined term"
                    );
                }
                NewDefinition {
                    id: Uuid::new_v4(),
                    term_display: d.term_display,
                    term_key: d.term_key,
                    definition_text: d.definition_text,
                    defining_chunk_id: owning_chunk(&spans, d.char_start),
                    scope_section_path: d.scope_section_path,
                    char_start: d.char_start as i32,
                    ambiguous: d.ambiguous,
                }
            })
            .collect();

        let references: Vec<NewCrossReference> = extract_references(&text, &spans)
            .into_iter()
            .map(|r| {
                let targets = resolve_label(&r.target_label, &outcome.sections, &spans);
                if targets.is_empty() {
                    warn!(
                        document_id = %document_id,
                        label = %r.target_label,
                        "Dangling cross-reference"
                    );
                }
                NewCrossReference {
                    id: Uuid::new_v4(),
                    source_chunk_id: r.source_chunk_id,
                    target_label: r.target_label,
                    resolved_chunk_ids: Some(targets),
                    kind: r.kind,
                }
            })
            .collect();

        let chunk_count = new_chunks.len() as i32;
        let indexables: Vec<IndexableChunk> = section_chunks
            .iter()
            .zip(new_chunks.iter())
            .map(|(c, n)| IndexableChunk {
                id: n.id,
                display_text: if c.section_path.is_empty() {
                    c.content.clone()
                } else {
                    format!("[Section {}] {}", c.section_path, c.content)
                },
            })
            .collect();

        self.repository
            .insert_chunks(document_id, new_chunks)
            .await
            .map_err(|source| IngestionError::Chunking { source })?;
        self.repository
            .insert_definitions(document_id, definitions)
            .await
            .map_err(|source| IngestionError::Chunking { source })?;
        self.repository
            .insert_cross_references(document_id, references)
            .await
            .map_err(|source| IngestionError::Chunking { source })?;
        self.repository
            .set_document_chunking_result(
                document_id,
                clausetrace_common::content_hash(&text),
                chunk_count,
            )
            .await
            .map_err(|source| IngestionError::Chunking { source })?;

        // Stage: indexing
        self.repository
            .transition_document_status(document_id, ProcessingStatus::Indexing, None, None)
            .await?;

        self.gateway
            .index_chunks(&indexables)
            .await
            .map_err(|source| IngestionError::Indexing { source })?;

        self.repository
            .transition_document_status(document_id, ProcessingStatus::Ready, None, None)
            .await?;

        info!(document_id = %document_id, chunk_count, "Document ready");
        Ok(chunk_count)
    }

    /// Status snapshot for a document
    pub async fn get_processing_status(&self, document_id: Uuid) -> Result<ProcessingStatusView> {
        let document = self
            .repository
            .find_document_by_id(document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: document_id.to_string(),
            })?;

        let status = document.processing_status();
        Ok(ProcessingStatusView {
            status,
            step_description: status.step_description().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_flight_guard_blocks_duplicates_until_released() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let id = Uuid::new_v4();

        assert!(set.lock().unwrap().insert(id));
        let guard = InFlightGuard {
            set: Arc::clone(&set),
            id,
        };

        // A second run on the same document is refused while the first holds
        // the guard
        assert!(!set.lock().unwrap().insert(id));

        drop(guard);
        assert!(set.lock().unwrap().insert(id));
    }

    #[test]
    fn test_guard_releases_on_panic_unwind() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let id = Uuid::new_v4();
        set.lock().unwrap().insert(id);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = InFlightGuard {
                set: Arc::clone(&set),
                id,
            };
            panic!("pipeline blew up");
        }));
        assert!(result.is_err());
        assert!(!set.lock().unwrap().contains(&id));
    }

    #[tokio::test]
    async fn test_guard_travels_into_background_task_and_releases() {
        let set = Arc::new(Mutex::new(HashSet::new()));
        let id = Uuid::new_v4();
        set.lock().unwrap().insert(id);

        let guard = InFlightGuard {
            set: Arc::clone(&set),
            id,
        };
        let handle = tokio::spawn(async move {
            let held = guard;
            assert!(held.set.lock().unwrap().contains(&id));
        });
        handle.await.unwrap();

        assert!(!set.lock().unwrap().contains(&id));
    }
}
