//! Database migration system
//!
//! Schema versioning plus idempotent application of the span table, its
//! indices, and the dependent view. Runs on every startup, after the
//! span-table reshape (see `span_migration`) has had its chance to run, so
//! the `IF NOT EXISTS` DDL here doubles as the view-recreation step the
//! reshape relies on.

use sqlx::SqlitePool;

use super::error::SqliteError;
use super::schema::{MODEL_INVOCATION_VIEW_DDL, SCHEMA, SCHEMA_VERSION, SPAN_TABLE_DDL};

/// Apply the schema and record the version for a fresh database; re-apply
/// the idempotent DDL for an existing one.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteError> {
    let start = std::time::Instant::now();

    let version_table_exists: bool = sqlx::query_scalar(
        "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
    )
    .fetch_one(pool)
    .await?;

    let mut tx = pool.begin().await?;

    for statements in [SCHEMA, SPAN_TABLE_DDL, MODEL_INVOCATION_VIEW_DDL] {
        for statement in statements.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            sqlx::query(statement).execute(&mut *tx).await.map_err(|e| {
                SqliteError::MigrationFailed {
                    version: SCHEMA_VERSION,
                    name: "initial_schema".to_string(),
                    error: format!(
                        "Failed at statement: {} - {}",
                        &statement[..statement.len().min(50)],
                        e
                    ),
                }
            })?;
        }
    }

    let elapsed_ms = start.elapsed().as_millis() as i64;
    if !version_table_exists {
        let now = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        sqlx::query(
            "INSERT INTO schema_version (id, version, applied_at, description) \
             VALUES (1, ?, ?, 'Initial schema')",
        )
        .bind(SCHEMA_VERSION)
        .bind(now)
        .execute(&mut *tx)
        .await?;
        sqlx::query(
            "INSERT INTO schema_migrations (version, name, applied_at, execution_time_ms, success) \
             VALUES (?, 'initial_schema', ?, ?, 1)",
        )
        .bind(SCHEMA_VERSION)
        .bind(now)
        .bind(elapsed_ms)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    if version_table_exists {
        tracing::debug!("Database schema is up to date (version {})", SCHEMA_VERSION);
    } else {
        tracing::debug!(
            "Initialized database with schema version {} in {}ms",
            SCHEMA_VERSION,
            elapsed_ms
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::sqlite::test_pool;

    #[tokio::test]
    async fn fresh_database_gets_schema_and_version() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        let version: i32 = sqlx::query_scalar("SELECT version FROM schema_version WHERE id = 1")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let has_view: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='view' AND name='model_invocation_view'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(has_view);
    }

    #[tokio::test]
    async fn reapplying_schema_is_idempotent() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let versions: i32 = sqlx::query_scalar("SELECT COUNT(*) FROM schema_version")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[tokio::test]
    async fn schema_recreates_a_dropped_view() {
        let pool = test_pool().await;
        run_migrations(&pool).await.unwrap();

        sqlx::query("DROP VIEW model_invocation_view")
            .execute(&pool)
            .await
            .unwrap();
        run_migrations(&pool).await.unwrap();

        let has_view: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='view' AND name='model_invocation_view'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(has_view);
    }
}
