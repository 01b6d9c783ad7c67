//! ClauseTrace Ingestion Service
//!
//! Standalone binary for running the ingestion pipeline against documents
//! already uploaded in `pending` status. The gateway normally drives the
//! processor in-process; this binary exists for operational reprocessing.

use clausetrace_common::config::AppConfig;
use clausetrace_common::db::{DbPool, Repository};
use clausetrace_common::embeddings::create_embedder;
use clausetrace_common::index::{PgSearchIndex, PgVectorStore};
use clausetrace_common::VERSION;
use clausetrace_ingestion::indexing::IndexingGateway;
use clausetrace_ingestion::processor::IngestionProcessor;
use std::sync::Arc;
use tracing::{error, info, Level};
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting ClauseTrace Ingestion Service v{}", VERSION);

    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    info!("Connecting to database...");
    let db = Arc::new(DbPool::new(&config.database).await?);
    let repository = Repository::new(db.as_ref().clone());

    let embedder = create_embedder(&config.embedding)?;
    let gateway = IndexingGateway::new(
        embedder,
        Arc::new(PgVectorStore::new(db.clone())),
        Arc::new(PgSearchIndex::new(db.clone())),
        config.embedding.batch_size,
    );
    let processor = IngestionProcessor::new(repository, gateway, config.chunking.clone());

    // Document ids to process come from the command line
    let ids: Vec<Uuid> = std::env::args()
        .skip(1)
        .map(|arg| arg.parse())
        .collect::<Result<_, _>>()?;

    if ids.is_empty() {
        info!("No document ids given, nothing to do");
        return Ok(());
    }

    for id in ids {
        match processor.process_document(id).await {
            Ok(result) => info!(
                document_id = %id,
                status = ?result.status,
                chunk_count = result.chunk_count,
                "Processing finished"
            ),
            Err(e) => error!(document_id = %id, error = %e, "Processing failed"),
        }
    }

    Ok(())
}
