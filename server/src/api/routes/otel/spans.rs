//! Stored-span query endpoints

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::Deserialize;

use super::OtelApiState;
use crate::api::types::{ApiError, DEFAULT_LATEST_LIMIT, MAX_LATEST_LIMIT};
use crate::data::sqlite::repositories::span as span_repository;
use crate::domain::traces::SpanData;

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub limit: Option<i64>,
}

pub async fn latest(
    State(state): State<OtelApiState>,
    Query(query): Query<LatestQuery>,
) -> Result<Json<Vec<SpanData>>, ApiError> {
    let limit = query.limit.unwrap_or(DEFAULT_LATEST_LIMIT);
    if limit < 1 || limit > MAX_LATEST_LIMIT {
        return Err(ApiError::bad_request(format!(
            "limit must be between 1 and {MAX_LATEST_LIMIT}"
        )));
    }
    Ok(Json(span_repository::latest_spans(&state.pool, limit).await?))
}

pub async fn by_trace(
    State(state): State<OtelApiState>,
    Path(trace_id): Path<String>,
) -> Result<Json<Vec<SpanData>>, ApiError> {
    Ok(Json(
        span_repository::spans_by_trace(&state.pool, &trace_id).await?,
    ))
}

pub async fn by_run(
    State(state): State<OtelApiState>,
    Path(run_id): Path<String>,
) -> Result<Json<Vec<SpanData>>, ApiError> {
    Ok(Json(
        span_repository::spans_by_run(&state.pool, &run_id).await?,
    ))
}
