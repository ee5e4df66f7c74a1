//! OTLP collector endpoints
//!
//! The HTTP half of the ingestion surface. The gRPC half lives in `grpc`
//! and shares the same `IngestService`.

pub mod encoding;
mod grpc;
mod traces;

use std::sync::Arc;

use axum::Router;
use axum::routing::post;

use crate::domain::traces::IngestService;

pub use grpc::OtlpGrpcServer;

#[derive(Clone)]
pub struct OtlpState {
    pub ingest: Arc<IngestService>,
}

pub fn routes(ingest: Arc<IngestService>) -> Router<()> {
    let state = OtlpState { ingest };

    Router::new()
        .route("/traces", post(traces::export))
        .with_state(state)
}
