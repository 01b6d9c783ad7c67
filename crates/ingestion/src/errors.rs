//! Ingestion error types
//!
//! Stage-tagged wrapper around the shared error type so a failed pipeline
//! run can record which stage broke on the document row.

use clausetrace_common::errors::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestionError {
    #[error("extraction stage failed: {source}")]
    Extraction {
        #[source]
        source: AppError,
    },

    #[error("chunking stage failed: {source}")]
    Chunking {
        #[source]
        source: AppError,
    },

    #[error("indexing stage failed: {source}")]
    Indexing {
        #[source]
        source: AppError,
    },

    #[error(transparent)]
    Database(#[from] AppError),
}

impl IngestionError {
    /// Stage name recorded on the document row when the run fails
    pub fn failed_stage(&self) -> &'static str {
        match self {
            IngestionError::Extraction { .. } => "extracting",
            IngestionError::Chunking { .. } => "chunking",
            IngestionError::Indexing { .. } => "indexing",
            IngestionError::Database(_) => "database",
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    fn boom() -> AppError {
        AppError::Internal {
            message: "boom".to_string(),
        }
    }

    #[test]
    fn test_failed_stage_names_the_pipeline_stage() {
        assert_eq!(
            IngestionError::Extraction { source: boom() }.failed_stage(),
            "extracting"
        );
        assert_eq!(
            IngestionError::Chunking { source: boom() }.failed_stage(),
            "chunking"
        );
        assert_eq!(
            IngestionError::Indexing { source: boom() }.failed_stage(),
            "indexing"
        );
        assert_eq!(IngestionError::Database(boom()).failed_stage(), "database");
    }
}
