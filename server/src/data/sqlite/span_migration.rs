//! One-time span table reshape.
//!
//! Earlier releases persisted spans under a different physical schema
//! (camelCase columns, ISO timestamps, string status codes). On startup,
//! before any listener binds, this module detects the old shape, backs the
//! table up under a fixed name, creates the current shape, re-derives every
//! historical row through the legacy-protocol rewrite and the span decoder,
//! verifies the copy, and drops the backup.
//!
//! The procedure is idempotent: a table that is absent or already in the
//! new shape short-circuits, and a stale backup left by a crashed run is
//! dropped before the rename, so rerunning on every startup is safe. It is
//! NOT safe to run concurrently with live ingestion into the same table;
//! startup ordering, not a lock, enforces that.

use serde_json::{Map as JsonMap, Value as JsonValue};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};

use super::error::SqliteError;
use super::repositories::span as span_repository;
use super::schema::{MODEL_INVOCATION_VIEW, SPAN_TABLE, SPAN_TABLE_DDL};
use crate::domain::traces::{convert_record, project_row};

/// Fixed backup name; exists only while a migration is in flight.
pub const BACKUP_TABLE: &str = "span_table_old_backup";

/// Rows are re-derived and inserted in batches of this size, each batch in
/// its own transaction. A failed batch does not undo previously committed
/// batches.
const COPY_BATCH_SIZE: usize = 100;

/// What the migration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// Table absent or already in the new shape; nothing touched.
    NotNeeded,
    /// Table was rebuilt. `errors` counts rows that could not be converted.
    Completed { migrated: u64, errors: u64 },
}

/// Run the span table migration. Errors roll back the open transaction and
/// propagate; the caller decides whether startup continues.
pub async fn migrate_span_table(pool: &SqlitePool) -> Result<MigrationOutcome, SqliteError> {
    SpanTableMigration::new(pool).run().await
}

/// Migration context, threaded explicitly through every step.
struct SpanTableMigration<'a> {
    pool: &'a SqlitePool,
    migrated: u64,
    errors: u64,
}

impl<'a> SpanTableMigration<'a> {
    fn new(pool: &'a SqlitePool) -> Self {
        Self {
            pool,
            migrated: 0,
            errors: 0,
        }
    }

    async fn run(mut self) -> Result<MigrationOutcome, SqliteError> {
        if !self.needs_migration().await? {
            return Ok(MigrationOutcome::NotNeeded);
        }

        tracing::info!("Span table has the old shape, starting migration");

        self.back_up().await.map_err(step_error("backup"))?;
        self.rebuild().await.map_err(step_error("rebuild"))?;
        self.copy_data().await.map_err(step_error("copy"))?;
        self.verify().await.map_err(step_error("verify"))?;
        self.clean_up().await.map_err(step_error("cleanup"))?;

        tracing::info!(
            migrated = self.migrated,
            errors = self.errors,
            "Span table migration complete"
        );
        Ok(MigrationOutcome::Completed {
            migrated: self.migrated,
            errors: self.errors,
        })
    }

    /// The new shape is recognized by its span-identifier and
    /// instrumentation-version columns.
    async fn needs_migration(&self) -> Result<bool, SqliteError> {
        let table_exists: bool = sqlx::query_scalar(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name=?",
        )
        .bind(SPAN_TABLE)
        .fetch_one(self.pool)
        .await?;
        if !table_exists {
            tracing::debug!("No span table, migration not needed");
            return Ok(false);
        }

        let columns: Vec<String> =
            sqlx::query(&format!("PRAGMA table_info({SPAN_TABLE})"))
                .fetch_all(self.pool)
                .await?
                .iter()
                .map(|row| row.get::<String, _>("name"))
                .collect();

        let has_new_shape = columns.iter().any(|c| c == "span_id")
            && columns.iter().any(|c| c == "instrumentation_version");
        if has_new_shape {
            tracing::debug!("Span table already has the new shape");
        }
        Ok(!has_new_shape)
    }

    /// Drop the dependent view, drop any stale backup from a crashed run,
    /// and rename the live table away. Committed as one transaction before
    /// anything else happens, so a crash later leaves the backup intact.
    async fn back_up(&self) -> Result<(), SqliteError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(&format!("DROP VIEW IF EXISTS {MODEL_INVOCATION_VIEW}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!("DROP TABLE IF EXISTS {BACKUP_TABLE}"))
            .execute(&mut *tx)
            .await?;
        sqlx::query(&format!(
            "ALTER TABLE {SPAN_TABLE} RENAME TO {BACKUP_TABLE}"
        ))
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        tracing::debug!(backup = BACKUP_TABLE, "Old span table renamed");
        Ok(())
    }

    /// Create the new table with its full column and index set.
    async fn rebuild(&self) -> Result<(), SqliteError> {
        let mut tx = self.pool.begin().await?;
        for statement in SPAN_TABLE_DDL
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        tracing::debug!("New span table created");
        Ok(())
    }

    /// Re-derive every backup row through the legacy adapter, the record
    /// decoder, and the row projection. A row that fails conversion is
    /// counted and skipped; a batch that fails to insert counts all of its
    /// rows and does not stop the loop.
    async fn copy_data(&mut self) -> Result<(), SqliteError> {
        let old_rows = sqlx::query(&format!("SELECT * FROM {BACKUP_TABLE}"))
            .fetch_all(self.pool)
            .await?;
        let total = old_rows.len();
        if total == 0 {
            tracing::info!("No historical spans to migrate");
            return Ok(());
        }
        tracing::info!(total, "Migrating historical spans");

        for batch in old_rows.chunks(COPY_BATCH_SIZE) {
            let mut converted = Vec::with_capacity(batch.len());
            for old_row in batch {
                let record = row_to_json(old_row);
                match convert_record(&record) {
                    Ok(span) => converted.push(project_row(span)),
                    Err(e) => {
                        self.errors += 1;
                        tracing::warn!(
                            error = %e,
                            id = record.get("id").map(|v| v.to_string()).unwrap_or_default(),
                            "Skipping unconvertible span record"
                        );
                    }
                }
            }

            let batch_len = converted.len() as u64;
            match span_repository::upsert_spans(self.pool, &converted).await {
                Ok(_) => self.migrated += batch_len,
                Err(e) => {
                    self.errors += batch_len;
                    tracing::warn!(error = %e, rows = batch_len, "Batch insert failed, skipping batch");
                }
            }
            tracing::debug!(
                migrated = self.migrated,
                errors = self.errors,
                total,
                "Span migration progress"
            );
        }

        Ok(())
    }

    /// Count check is a warning, not a failure: availability wins over
    /// strictness here.
    async fn verify(&self) -> Result<(), SqliteError> {
        let count = span_repository::count_spans(self.pool).await? as u64;
        if count != self.migrated {
            tracing::warn!(
                table_rows = count,
                migrated = self.migrated,
                "Row count after migration does not match migrated count"
            );
        }
        Ok(())
    }

    async fn clean_up(&self) -> Result<(), SqliteError> {
        sqlx::query(&format!("DROP TABLE IF EXISTS {BACKUP_TABLE}"))
            .execute(self.pool)
            .await?;
        tracing::debug!(backup = BACKUP_TABLE, "Backup table dropped");
        Ok(())
    }
}

fn step_error(step: &'static str) -> impl FnOnce(SqliteError) -> SqliteError {
    move |e| SqliteError::SpanMigrationFailed {
        step,
        error: e.to_string(),
    }
}

/// Read one legacy row, whatever its column set, into a JSON map.
fn row_to_json(row: &SqliteRow) -> JsonMap<String, JsonValue> {
    let mut record = JsonMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = match row.try_get_raw(index) {
            Ok(raw) if raw.is_null() => JsonValue::Null,
            Ok(raw) => match raw.type_info().name() {
                "INTEGER" => row
                    .try_get::<i64, _>(index)
                    .map(JsonValue::from)
                    .unwrap_or(JsonValue::Null),
                "REAL" => row
                    .try_get::<f64, _>(index)
                    .ok()
                    .and_then(|f| serde_json::Number::from_f64(f).map(JsonValue::Number))
                    .unwrap_or(JsonValue::Null),
                "BLOB" => row
                    .try_get::<Vec<u8>, _>(index)
                    .map(|b| JsonValue::String(hex::encode(b)))
                    .unwrap_or(JsonValue::Null),
                _ => row
                    .try_get::<String, _>(index)
                    .map(JsonValue::String)
                    .unwrap_or(JsonValue::Null),
            },
            Err(_) => JsonValue::Null,
        };
        record.insert(column.name().to_string(), value);
    }
    record
}
