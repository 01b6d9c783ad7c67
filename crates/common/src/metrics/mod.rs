//! Metrics and observability utilities
//!
//! Prometheus metrics with SLO-aligned histograms and standardized
//! naming conventions.

use metrics::{
    counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram, Unit,
};
use std::time::Instant;

/// Metrics prefix for all ClauseTrace metrics
pub const METRICS_PREFIX: &str = "clausetrace";

/// Histogram buckets for request latency (in seconds)
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005, 0.010, 0.025, 0.050, 0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 20.00,
];

/// Buckets for document processing latency (chunking plus index writes)
pub const PROCESSING_BUCKETS: &[f64] = &[
    0.100, 0.250, 0.500, 1.000, 2.500, 5.000, 10.00, 30.00, 60.00, 120.0,
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // Retrieval metrics
    describe_counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        Unit::Count,
        "Total retrieval queries"
    );

    describe_histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end retrieval latency in seconds"
    );

    describe_histogram!(
        format!("{}_round_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Per-round retrieval latency in seconds"
    );

    describe_gauge!(
        format!("{}_bundle_chunks", METRICS_PREFIX),
        Unit::Count,
        "Chunks in the assembled context bundle"
    );

    describe_counter!(
        format!("{}_retrieval_warnings_total", METRICS_PREFIX),
        Unit::Count,
        "Soft warnings recorded during retrieval"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents processed"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    describe_histogram!(
        format!("{}_processing_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Document processing latency in seconds"
    );

    // Embedding metrics
    describe_counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API requests"
    );

    describe_histogram!(
        format!("{}_embedding_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Embedding generation latency in seconds"
    );

    describe_counter!(
        format!("{}_embedding_errors_total", METRICS_PREFIX),
        Unit::Count,
        "Total embedding API errors"
    );

    // Conflict and citation metrics
    describe_counter!(
        format!("{}_numeric_conflicts_total", METRICS_PREFIX),
        Unit::Count,
        "Numeric conflicts detected in assembled bundles"
    );

    describe_counter!(
        format!("{}_unresolved_citations_total", METRICS_PREFIX),
        Unit::Count,
        "Citation markers that did not resolve to a bundle position"
    );

    // Database metrics
    describe_histogram!(
        format!("{}_db_query_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "Database query latency in seconds"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record a completed retrieval query
pub fn record_retrieval(duration_secs: f64, intent: &str, bundle_chunks: usize, warnings: usize) {
    counter!(
        format!("{}_queries_total", METRICS_PREFIX),
        "intent" => intent.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_retrieval_duration_seconds", METRICS_PREFIX),
        "intent" => intent.to_string()
    )
    .record(duration_secs);

    gauge!(format!("{}_bundle_chunks", METRICS_PREFIX)).set(bundle_chunks as f64);

    if warnings > 0 {
        counter!(format!("{}_retrieval_warnings_total", METRICS_PREFIX))
            .increment(warnings as u64);
    }
}

/// Record a single retrieval round
pub fn record_round(round: u8, duration_secs: f64, added_chunks: usize) {
    histogram!(
        format!("{}_round_duration_seconds", METRICS_PREFIX),
        "round" => round.to_string()
    )
    .record(duration_secs);

    gauge!(
        format!("{}_bundle_chunks", METRICS_PREFIX),
        "round" => round.to_string()
    )
    .set(added_chunks as f64);
}

/// Record a completed document processing run
pub fn record_processing(duration_secs: f64, chunks_created: usize, outcome: &str) {
    counter!(
        format!("{}_documents_processed_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    counter!(format!("{}_chunks_created_total", METRICS_PREFIX))
        .increment(chunks_created as u64);

    histogram!(format!("{}_processing_duration_seconds", METRICS_PREFIX)).record(duration_secs);
}

/// Record an embedding request
pub fn record_embedding(duration_secs: f64, model: &str, success: bool) {
    let status = if success { "success" } else { "error" };

    counter!(
        format!("{}_embedding_requests_total", METRICS_PREFIX),
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);

    if success {
        histogram!(
            format!("{}_embedding_duration_seconds", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .record(duration_secs);
    } else {
        counter!(
            format!("{}_embedding_errors_total", METRICS_PREFIX),
            "model" => model.to_string()
        )
        .increment(1);
    }
}

/// Record numeric conflicts surfaced with an answer
pub fn record_conflicts(count: usize) {
    if count > 0 {
        counter!(format!("{}_numeric_conflicts_total", METRICS_PREFIX)).increment(count as u64);
    }
}

/// Record unresolved citation markers
pub fn record_unresolved_citations(count: usize) {
    if count > 0 {
        counter!(format!("{}_unresolved_citations_total", METRICS_PREFIX))
            .increment(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_sorted() {
        let mut prev = 0.0;
        for &bucket in LATENCY_BUCKETS {
            assert!(bucket > prev);
            prev = bucket;
        }
    }

    #[test]
    fn test_request_metrics() {
        let metrics = RequestMetrics::start("POST", "/query");
        std::thread::sleep(std::time::Duration::from_millis(5));
        metrics.finish(200);
    }
}
