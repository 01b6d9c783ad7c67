//! Document processing handlers

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use clausetrace_common::errors::Result;
use clausetrace_ingestion::processor::ProcessingStatusView;
use uuid::Uuid;

/// Start the ingestion pipeline for a document
///
/// The pipeline runs as a background task; callers poll the status
/// endpoint for progress. Idempotent: an already processed document
/// reports its terminal status without a new run. A document with a run
/// in flight returns 409.
pub async fn process_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<ProcessingStatusView>)> {
    let accepted = state.processor.clone().start_processing(id).await?;

    tracing::info!(
        document_id = %id,
        status = ?accepted.status,
        "Document processing started"
    );

    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// Poll a document's processing status
pub async fn get_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProcessingStatusView>> {
    let status = state.processor.get_processing_status(id).await?;
    Ok(Json(status))
}
