//! Query and search handlers

use crate::AppState;
use axum::{extract::State, Json};
use clausetrace_common::errors::{AppError, Result};
use clausetrace_retrieval::{QueryAnswer, SearchOutcome};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;
use validator::Validate;

/// Question-answering request
#[derive(Debug, Deserialize, Validate)]
pub struct QueryRequest {
    #[validate(length(min = 1, max = 2000))]
    pub question: String,

    /// Documents to answer against
    #[validate(length(min = 1, max = 50))]
    pub document_ids: Vec<Uuid>,

    /// Prior turns, oldest first
    #[serde(default)]
    pub conversation_history: Vec<String>,
}

#[derive(Serialize)]
pub struct QueryResponse {
    #[serde(flatten)]
    pub answer: QueryAnswer,
    pub processing_time_ms: u64,
}

/// Search-only request
#[derive(Debug, Deserialize, Validate)]
pub struct SearchRequest {
    #[validate(length(min = 1, max = 1000))]
    pub query: String,

    #[validate(length(min = 1, max = 50))]
    pub document_ids: Vec<Uuid>,

    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Serialize)]
pub struct SearchResponse {
    #[serde(flatten)]
    pub outcome: SearchOutcome,
    pub total_results: usize,
    pub processing_time_ms: u64,
}

/// Answer a question against processed documents
pub async fn answer_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let answer = state
        .retrieval
        .answer_query(
            &request.question,
            &request.document_ids,
            &request.conversation_history,
        )
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        answer_id = %answer.answer_id,
        intent = answer.intent.as_str(),
        citations = answer.citations.len(),
        conflicts = answer.conflicts.len(),
        latency_ms = processing_time_ms,
        "Query completed"
    );

    Ok(Json(QueryResponse {
        answer,
        processing_time_ms,
    }))
}

/// Hybrid search without answer generation
pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    let start = Instant::now();

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let outcome = state
        .retrieval
        .search_documents(&request.query, &request.document_ids, request.limit)
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        query = %request.query,
        results = outcome.results.len(),
        latency_ms = processing_time_ms,
        "Search completed"
    );

    Ok(Json(SearchResponse {
        total_results: outcome.results.len(),
        outcome,
        processing_time_ms,
    }))
}
