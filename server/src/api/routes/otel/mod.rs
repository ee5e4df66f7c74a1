//! Read API over the stored spans
//!
//! Serves the studio UI: newest spans, the spans of one trace, the spans of
//! one run, and a live SSE stream per run.

pub mod spans;
pub mod sse;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use sqlx::SqlitePool;
use tokio::sync::watch;

use crate::data::topics::TopicService;

#[derive(Clone)]
pub struct OtelApiState {
    pub pool: SqlitePool,
    pub topics: Arc<TopicService>,
    pub shutdown_rx: watch::Receiver<bool>,
}

pub fn routes(
    pool: SqlitePool,
    topics: Arc<TopicService>,
    shutdown_rx: watch::Receiver<bool>,
) -> Router<()> {
    let state = OtelApiState {
        pool,
        topics,
        shutdown_rx,
    };

    Router::new()
        .route("/traces/latest", get(spans::latest))
        .route("/traces/{trace_id}/spans", get(spans::by_trace))
        .route("/runs/{run_id}/spans", get(spans::by_run))
        .route("/runs/{run_id}/events", get(sse::run_events))
        .with_state(state)
}
