//! Relational store: connection pool, migrations, chat history, the lender
//! catalog and the JSON importer.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;

use crate::core::errors::ApiError;

pub mod catalog;
pub mod conversations;
pub mod import;
pub mod models;

pub use catalog::{CatalogStore, ProgramSummary, RuleFilter};
pub use conversations::ConversationStore;
pub use import::{import_data, ImportReport};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Shared handle to the relational database.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if needed) the SQLite database named by `url`,
    /// e.g. `sqlite://mortgage.db`.
    pub async fn connect(url: &str) -> Result<Self, ApiError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| ApiError::BadRequest(format!("Invalid DATABASE_URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to connect to database: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), ApiError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| ApiError::internal(format!("Failed to apply migrations: {}", e)))?;
        tracing::info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn conversations(&self) -> ConversationStore {
        ConversationStore::new(self.pool.clone())
    }

    pub fn catalog(&self) -> CatalogStore {
        CatalogStore::new(self.pool.clone())
    }
}
