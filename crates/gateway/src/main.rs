//! ClauseTrace API Gateway
//!
//! The HTTP entry point: document processing, status polling, question
//! answering, and search, plus health endpoints and the Prometheus
//! metrics exporter.

mod handlers;

use axum::{
    routing::{get, post},
    Router,
};
use clausetrace_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    generator::create_generator,
    index::{PgSearchIndex, PgVectorStore},
    metrics,
};
use clausetrace_ingestion::indexing::IndexingGateway;
use clausetrace_ingestion::processor::IngestionProcessor;
use clausetrace_retrieval::{RetrievalOrchestrator, RetrievalService};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DbPool>,
    pub processor: Arc<IngestionProcessor>,
    pub retrieval: Arc<RetrievalService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting ClauseTrace API Gateway v{}", clausetrace_common::VERSION);

    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;
    let config = Arc::new(config);

    if config.observability.metrics_port > 0 {
        PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from((
                [0, 0, 0, 0],
                config.observability.metrics_port,
            )))
            .install()?;
    }
    metrics::register_metrics();

    info!("Connecting to database...");
    let db = Arc::new(DbPool::new(&config.database).await?);
    let repository = Arc::new(Repository::new(db.as_ref().clone()));

    let embedder = create_embedder(&config.embedding)?;
    let vector_store = Arc::new(PgVectorStore::new(db.clone()));
    let search_index = Arc::new(PgSearchIndex::new(db.clone()));

    let gateway = IndexingGateway::new(
        embedder.clone(),
        vector_store.clone(),
        search_index.clone(),
        config.embedding.batch_size,
    );
    let processor = Arc::new(IngestionProcessor::new(
        repository.as_ref().clone(),
        gateway,
        config.chunking.clone(),
    ));

    let orchestrator = RetrievalOrchestrator::new(
        embedder,
        vector_store,
        search_index,
        repository.clone(),
        config.retrieval.clone(),
    );
    let generator = create_generator(&config.generator)?;
    let retrieval = Arc::new(RetrievalService::new(
        orchestrator,
        repository,
        generator,
        config.retrieval.clone(),
        config.generator.clone(),
    ));

    let state = AppState {
        config: config.clone(),
        db,
        processor,
        retrieval,
    };

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    Router::new()
        // Health endpoints
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Document processing
        .route(
            "/documents/{id}/process",
            post(handlers::documents::process_document),
        )
        .route(
            "/documents/{id}/status",
            get(handlers::documents::get_status),
        )
        // Query and search
        .route("/query", post(handlers::query::answer_query))
        .route("/search", post(handlers::query::search))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
