//! Span repository
//!
//! Writes are upserts keyed by span id, so re-delivered batches (the
//! ingestion path is at-least-once) converge instead of duplicating. The
//! JSON columns carry the canonical record; reads rebuild `SpanData` from
//! them.

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::data::sqlite::SqliteError;
use crate::domain::traces::{SpanData, SpanRow};

const INSERT_SPAN: &str = r#"
INSERT OR REPLACE INTO span_table (
    id, trace_id, span_id, trace_state, parent_span_id, flags, name, kind,
    start_time_unix_nano, end_time_unix_nano, attributes,
    dropped_attributes_count, events, dropped_events_count, links,
    dropped_links_count, status, resource, scope, status_code, service_name,
    operation_name, instrumentation_name, instrumentation_version, model,
    input_tokens, output_tokens, total_tokens, run_id, latency_ns
) VALUES (
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
    ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?
)
"#;

const SELECT_COLUMNS: &str = r#"
SELECT trace_id, span_id, trace_state, parent_span_id, flags, name, kind,
       start_time_unix_nano, end_time_unix_nano, attributes,
       dropped_attributes_count, events, dropped_events_count, links,
       dropped_links_count, status, resource, scope, run_id, latency_ns
FROM span_table
"#;

/// Upsert a batch of projected rows in one transaction.
pub async fn upsert_spans(pool: &SqlitePool, rows: &[SpanRow]) -> Result<u64, SqliteError> {
    if rows.is_empty() {
        return Ok(0);
    }

    let mut tx = pool.begin().await?;
    for row in rows {
        let span = &row.span;
        sqlx::query(INSERT_SPAN)
            .bind(&span.span_id)
            .bind(&span.trace_id)
            .bind(&span.span_id)
            .bind(&span.trace_state)
            .bind(&span.parent_span_id)
            .bind(span.flags.map(|f| f as i64))
            .bind(&span.name)
            .bind(span.kind)
            .bind(&span.start_time_unix_nano)
            .bind(&span.end_time_unix_nano)
            .bind(span.attributes.to_string())
            .bind(span.dropped_attributes_count as i64)
            .bind(serde_json::to_string(&span.events).unwrap_or_else(|_| "[]".to_string()))
            .bind(span.dropped_events_count as i64)
            .bind(serde_json::to_string(&span.links).unwrap_or_else(|_| "[]".to_string()))
            .bind(span.dropped_links_count as i64)
            .bind(serde_json::to_string(&span.status).unwrap_or_else(|_| "{}".to_string()))
            .bind(serde_json::to_string(&span.resource).unwrap_or_else(|_| "{}".to_string()))
            .bind(serde_json::to_string(&span.scope).unwrap_or_else(|_| "{}".to_string()))
            .bind(row.status_code)
            .bind(&row.service_name)
            .bind(&row.operation_name)
            .bind(&row.instrumentation_name)
            .bind(&row.instrumentation_version)
            .bind(&row.model)
            .bind(row.input_tokens)
            .bind(row.output_tokens)
            .bind(row.total_tokens)
            .bind(&span.run_id)
            .bind(span.latency_ns)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(rows.len() as u64)
}

/// Newest spans first.
pub async fn latest_spans(pool: &SqlitePool, limit: i64) -> Result<Vec<SpanData>, SqliteError> {
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} ORDER BY CAST(start_time_unix_nano AS INTEGER) DESC LIMIT ?"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_span).collect()
}

/// All spans of one trace, in start-time order.
pub async fn spans_by_trace(
    pool: &SqlitePool,
    trace_id: &str,
) -> Result<Vec<SpanData>, SqliteError> {
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE trace_id = ? ORDER BY CAST(start_time_unix_nano AS INTEGER) ASC"
    ))
    .bind(trace_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_span).collect()
}

/// All spans of one run, in start-time order.
pub async fn spans_by_run(pool: &SqlitePool, run_id: &str) -> Result<Vec<SpanData>, SqliteError> {
    let rows = sqlx::query(&format!(
        "{SELECT_COLUMNS} WHERE run_id = ? ORDER BY CAST(start_time_unix_nano AS INTEGER) ASC"
    ))
    .bind(run_id)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_span).collect()
}

pub async fn count_spans(pool: &SqlitePool) -> Result<i64, SqliteError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM span_table")
        .fetch_one(pool)
        .await?)
}

fn row_to_span(row: &SqliteRow) -> Result<SpanData, SqliteError> {
    fn parse_json<T: serde::de::DeserializeOwned>(
        row: &SqliteRow,
        column: &str,
    ) -> Result<T, SqliteError> {
        let raw: String = row.try_get(column)?;
        serde_json::from_str(&raw)
            .map_err(|e| SqliteError::CorruptRow(format!("{column}: {e}")))
    }

    Ok(SpanData {
        trace_id: row.try_get("trace_id")?,
        span_id: row.try_get("span_id")?,
        trace_state: row.try_get("trace_state")?,
        parent_span_id: row.try_get("parent_span_id")?,
        flags: row.try_get::<Option<i64>, _>("flags")?.map(|f| f as u32),
        name: row.try_get("name")?,
        kind: row.try_get::<i64, _>("kind")? as i32,
        start_time_unix_nano: row.try_get("start_time_unix_nano")?,
        end_time_unix_nano: row.try_get("end_time_unix_nano")?,
        attributes: parse_json(row, "attributes")?,
        dropped_attributes_count: row
            .try_get::<Option<i64>, _>("dropped_attributes_count")?
            .unwrap_or(0) as u32,
        events: parse_json(row, "events").unwrap_or_default(),
        dropped_events_count: row
            .try_get::<Option<i64>, _>("dropped_events_count")?
            .unwrap_or(0) as u32,
        links: parse_json(row, "links").unwrap_or_default(),
        dropped_links_count: row
            .try_get::<Option<i64>, _>("dropped_links_count")?
            .unwrap_or(0) as u32,
        status: parse_json(row, "status")?,
        resource: parse_json(row, "resource")?,
        scope: parse_json(row, "scope")?,
        run_id: row
            .try_get::<Option<String>, _>("run_id")?
            .unwrap_or_else(|| "unknown".to_string()),
        latency_ns: row.try_get("latency_ns")?,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::data::sqlite::{migrations, test_pool};
    use crate::domain::traces::{SpanResource, SpanScope, SpanStatus, project_row};

    async fn prepared_pool() -> SqlitePool {
        let pool = test_pool().await;
        migrations::run_migrations(&pool).await.unwrap();
        pool
    }

    fn sample_span(span_id: &str, trace_id: &str, start: &str, run_id: &str) -> SpanData {
        SpanData {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            trace_state: None,
            parent_span_id: None,
            flags: None,
            name: "chat gpt-x".to_string(),
            kind: 1,
            start_time_unix_nano: start.to_string(),
            end_time_unix_nano: format!("{}", start.parse::<i64>().unwrap() + 1500),
            attributes: json!({
                "gen_ai": {
                    "operation": {"name": "chat"},
                    "request": {"model": "gpt-x"},
                    "usage": {"input_tokens": 10, "output_tokens": 5},
                }
            }),
            dropped_attributes_count: 0,
            events: vec![],
            dropped_events_count: 0,
            links: vec![],
            dropped_links_count: 0,
            status: SpanStatus::default(),
            resource: SpanResource {
                attributes: json!({"service": {"name": "agent-api"}}),
                schema_url: None,
            },
            scope: SpanScope {
                name: "agentlens-sdk".to_string(),
                version: "0.4.2".to_string(),
                attributes: json!({}),
                schema_url: None,
            },
            run_id: run_id.to_string(),
            latency_ns: 1500,
        }
    }

    #[tokio::test]
    async fn upsert_and_read_back_roundtrips() {
        let pool = prepared_pool().await;
        let span = sample_span("s1", "t1", "1000", "run-1");
        upsert_spans(&pool, &[project_row(span.clone())]).await.unwrap();

        let stored = spans_by_trace(&pool, "t1").await.unwrap();
        assert_eq!(stored, vec![span]);
    }

    #[tokio::test]
    async fn upsert_by_span_id_replaces() {
        let pool = prepared_pool().await;
        let mut span = sample_span("s1", "t1", "1000", "run-1");
        upsert_spans(&pool, &[project_row(span.clone())]).await.unwrap();

        span.name = "chat gpt-x (redelivered)".to_string();
        upsert_spans(&pool, &[project_row(span)]).await.unwrap();

        assert_eq!(count_spans(&pool).await.unwrap(), 1);
        let stored = spans_by_trace(&pool, "t1").await.unwrap();
        assert_eq!(stored[0].name, "chat gpt-x (redelivered)");
    }

    #[tokio::test]
    async fn latest_spans_orders_newest_first() {
        let pool = prepared_pool().await;
        let rows: Vec<_> = [
            sample_span("s1", "t1", "1000", "run-1"),
            sample_span("s2", "t1", "3000", "run-1"),
            sample_span("s3", "t2", "2000", "run-2"),
        ]
        .into_iter()
        .map(project_row)
        .collect();
        upsert_spans(&pool, &rows).await.unwrap();

        let latest = latest_spans(&pool, 2).await.unwrap();
        assert_eq!(latest.len(), 2);
        assert_eq!(latest[0].span_id, "s2");
        assert_eq!(latest[1].span_id, "s3");
    }

    #[tokio::test]
    async fn spans_by_run_filters_and_orders() {
        let pool = prepared_pool().await;
        let rows: Vec<_> = [
            sample_span("s1", "t1", "2000", "run-1"),
            sample_span("s2", "t2", "1000", "run-1"),
            sample_span("s3", "t3", "1500", "run-2"),
        ]
        .into_iter()
        .map(project_row)
        .collect();
        upsert_spans(&pool, &rows).await.unwrap();

        let run_spans = spans_by_run(&pool, "run-1").await.unwrap();
        assert_eq!(run_spans.len(), 2);
        assert_eq!(run_spans[0].span_id, "s2");
        assert_eq!(run_spans[1].span_id, "s1");
    }

    #[tokio::test]
    async fn projection_columns_feed_the_view() {
        let pool = prepared_pool().await;
        let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);
        let span = sample_span("s1", "t1", &now_ns.to_string(), "run-1");
        upsert_spans(&pool, &[project_row(span)]).await.unwrap();

        let (invocations, tokens): (i64, i64) = sqlx::query_as(
            "SELECT total_model_invocations, total_tokens FROM model_invocation_view",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(invocations, 1);
        assert_eq!(tokens, 15);
    }
}
