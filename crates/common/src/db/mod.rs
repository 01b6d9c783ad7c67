//! Postgres access for ClauseTrace
//!
//! One SeaORM pool shared by the gateway and the ingestion pipeline.
//! Reads prefer the replica when one is configured; every write, including
//! document status transitions, goes to the primary. The pgvector and FTS
//! statements issued by the index clients run over the same connections.

pub mod models;
mod repository;

pub use repository::{NewChunk, NewCitation, NewCrossReference, NewDefinition, NewSection, Repository};

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use std::time::Duration;
use tracing::info;

async fn connect(url: &str, config: &DatabaseConfig, label: &str) -> Result<DatabaseConnection> {
    let mut options = ConnectOptions::new(url);
    options
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .sqlx_logging(true);

    Database::connect(options)
        .await
        .map_err(|e| AppError::DatabaseConnection {
            message: format!("{} connection failed: {}", label, e),
        })
}

/// Primary plus optional read-replica connections
#[derive(Clone)]
pub struct DbPool {
    pub primary: DatabaseConnection,

    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let primary = connect(&config.url, config, "primary").await?;

        let replica = match &config.read_url {
            Some(read_url) => Some(connect(read_url, config, "replica").await?),
            None => None,
        };

        info!(replica = replica.is_some(), "Database pool ready");
        Ok(Self { primary, replica })
    }

    /// Connection for reads; the replica when configured
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Connection for writes, always the primary
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Round-trip check against every configured connection
    pub async fn ping(&self) -> Result<()> {
        use sea_orm::ConnectionTrait;

        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }
}
