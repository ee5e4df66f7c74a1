//! Traces export endpoint
//!
//! `POST /v1/traces`, protobuf or JSON per the content type. JSON bodies
//! that fail the canonical OTLP/JSON mapping are retried through the
//! permissive decoder, so dumps from older protobuf-JS exporters (byte
//! arrays, Long objects, materialized unions) still ingest.
//!
//! Callers only ever see success or a transport-level decode failure;
//! span-level rejections inside an accepted batch never surface here.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
};
use serde_json::Value as JsonValue;

use super::OtlpState;
use super::encoding::{OtlpContentType, decode_request, success_response};

pub async fn export(
    State(state): State<OtlpState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let content_type = OtlpContentType::from_headers(&headers);

    let stored = match decode_request::<ExportTraceServiceRequest>(&body, content_type) {
        Ok(request) => state.ingest.ingest(&request).await,
        Err(e) => {
            if content_type == OtlpContentType::Json {
                // Canonical mapping failed; try the permissive legacy shape.
                match serde_json::from_slice::<JsonValue>(&body) {
                    Ok(request) => state.ingest.ingest_json(&request).await,
                    Err(_) => return e.into_response(content_type),
                }
            } else {
                return e.into_response(content_type);
            }
        }
    };

    if let Err(e) = stored {
        tracing::error!(error = %e, "Failed to store trace batch");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [(header::CONTENT_TYPE, "text/plain")],
            "Failed to store spans",
        )
            .into_response();
    }

    let response = ExportTraceServiceResponse {
        partial_success: None,
    };
    success_response(&response, content_type)
}
