//! Ingestion entry point.
//!
//! Both transports (OTLP/HTTP and gRPC) hand their decoded requests here.
//! Each batch is processed to completion before the caller responds:
//! decode, project, upsert, then fan out to live subscribers. Handlers are
//! stateless; concurrent batches share only the connection pool, and
//! writes are upserts keyed by span id, so at-least-once delivery
//! converges.

use std::sync::Arc;

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use serde_json::Value as JsonValue;
use sqlx::SqlitePool;

use crate::data::sqlite::SqliteError;
use crate::data::sqlite::repositories::span as span_repository;
use crate::data::topics::TopicService;

use super::decode::{process_export, process_export_json};
use super::model::SpanData;
use super::project::project_row;

/// Name of the per-run broadcast topic.
pub fn run_topic(run_id: &str) -> String {
    format!("run_spans:{run_id}")
}

pub struct IngestService {
    pool: SqlitePool,
    topics: Arc<TopicService>,
}

impl IngestService {
    pub fn new(pool: SqlitePool, topics: Arc<TopicService>) -> Self {
        Self { pool, topics }
    }

    /// Ingest a canonical OTLP export request.
    pub async fn ingest(
        &self,
        request: &ExportTraceServiceRequest,
    ) -> Result<Vec<SpanData>, SqliteError> {
        self.store_and_notify(process_export(request)).await
    }

    /// Ingest the permissive JSON shape produced by older exporters.
    pub async fn ingest_json(&self, request: &JsonValue) -> Result<Vec<SpanData>, SqliteError> {
        self.store_and_notify(process_export_json(request)).await
    }

    async fn store_and_notify(&self, spans: Vec<SpanData>) -> Result<Vec<SpanData>, SqliteError> {
        if spans.is_empty() {
            return Ok(spans);
        }

        let rows: Vec<_> = spans.iter().cloned().map(project_row).collect();
        span_repository::upsert_spans(&self.pool, &rows).await?;
        tracing::debug!(count = spans.len(), "Stored span batch");

        // Fire-and-forget notification; not part of the ingestion contract.
        for span in &spans {
            match self.topics.broadcast_topic::<SpanData>(&run_topic(&span.run_id)) {
                Ok(topic) => topic.publish(span.clone()),
                Err(e) => tracing::warn!(error = %e, "Failed to resolve span fan-out topic"),
            }
        }

        Ok(spans)
    }
}
