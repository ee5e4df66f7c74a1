//! SQLite database service
//!
//! Centralized storage for the span table. Optimized for single-user,
//! low-latency local use with WAL mode, in-memory temp storage, and
//! periodic checkpointing.
//!
//! Initialization order matters: the span-table reshape runs first, against
//! whatever shape is on disk, and only then is the idempotent schema
//! (table, indices, view) applied. Both happen before any listener binds.

pub mod error;
pub mod migrations;
pub mod repositories;
pub mod schema;
pub mod span_migration;

pub use error::SqliteError;
pub use sqlx::SqlitePool;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::core::constants::{
    SQLITE_BUSY_TIMEOUT_SECS, SQLITE_CACHE_SIZE, SQLITE_CHECKPOINT_INTERVAL_SECS,
    SQLITE_DB_FILENAME, SQLITE_MAX_CONNECTIONS, SQLITE_WAL_AUTOCHECKPOINT,
};

/// SQLite database service
///
/// Created once at server startup and shared across all modules.
pub struct SqliteService {
    pool: SqlitePool,
}

impl SqliteService {
    /// Open (or create) the database, run the span-table reshape, and apply
    /// the schema.
    ///
    /// A reshape failure is logged and startup continues in a degraded,
    /// pre-migration state; the idempotent shape check retries it on the
    /// next startup.
    pub async fn init(data_dir: &Path) -> Result<Self, SqliteError> {
        let db_dir = data_dir.join("sqlite");
        tokio::fs::create_dir_all(&db_dir).await?;
        let db_path = db_dir.join(SQLITE_DB_FILENAME);

        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(SQLITE_BUSY_TIMEOUT_SECS))
            .pragma("cache_size", SQLITE_CACHE_SIZE)
            .pragma("temp_store", "MEMORY")
            .pragma("wal_autocheckpoint", SQLITE_WAL_AUTOCHECKPOINT);

        let pool = SqlitePoolOptions::new()
            .max_connections(SQLITE_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;

        if let Err(e) = span_migration::migrate_span_table(&pool).await {
            tracing::error!(
                error = %e,
                "Span table migration failed; continuing with the table in its current state"
            );
        }

        migrations::run_migrations(&pool).await?;

        tracing::debug!(path = %db_path.display(), "SqliteService initialized");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn checkpoint(&self) -> Result<(), SqliteError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        tracing::debug!("WAL checkpoint completed");
        Ok(())
    }

    /// Close the connection pool gracefully
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("SQLite pool closed");
    }

    pub fn start_checkpoint_task(
        self: &Arc<Self>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let db = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(SQLITE_CHECKPOINT_INTERVAL_SECS));
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            tracing::debug!("WAL checkpoint task shutting down");
                            break;
                        }
                    }
                    _ = interval.tick() => {
                        if let Err(e) = db.checkpoint().await {
                            tracing::warn!("WAL checkpoint failed: {}", e);
                        }
                    }
                }
            }
        })
    }
}

/// Single-connection in-memory pool; a larger pool would hand each
/// connection its own empty database.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect(":memory:")
        .await
        .expect("in-memory sqlite pool")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_creates_database_and_schema() {
        let dir = tempfile::tempdir().unwrap();
        let service = SqliteService::init(dir.path()).await.unwrap();

        let count = repositories::span::count_spans(service.pool()).await.unwrap();
        assert_eq!(count, 0);

        service.checkpoint().await.unwrap();
        service.close().await;
    }

    #[tokio::test]
    async fn init_is_idempotent_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let service = SqliteService::init(dir.path()).await.unwrap();
        service.close().await;

        let service = SqliteService::init(dir.path()).await.unwrap();
        let count = repositories::span::count_spans(service.pool()).await.unwrap();
        assert_eq!(count, 0);
        service.close().await;
    }
}
