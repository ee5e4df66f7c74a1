//! Span decoding and batch processing.
//!
//! Two entry points feed the same canonical model. `process_export` walks a
//! prost `ExportTraceServiceRequest` (gRPC and canonical OTLP/HTTP);
//! `process_export_json` walks the looser JSON emitted by older protobuf-JS
//! exporters, where identifiers may be byte arrays, timestamps may be Long
//! objects, and `AnyValue` unions arrive with every field materialized.
//!
//! Both are defensive: a span that fails validation or decoding is dropped
//! from the batch with a warning, never failing the batch itself.

use opentelemetry_proto::tonic::collector::trace::v1::ExportTraceServiceRequest;
use opentelemetry_proto::tonic::common::v1::{InstrumentationScope, KeyValue};
use opentelemetry_proto::tonic::resource::v1::Resource;
use opentelemetry_proto::tonic::trace::v1::Span;
use opentelemetry_proto::tonic::trace::v1::span::{Event, Link};
use serde_json::Value as JsonValue;
use thiserror::Error;

use super::attributes::{get_nested_value, load_json_strings, unflatten};
use super::codec::{
    decode_identifier, decode_identifier_json, decode_key_values_json, decode_unix_nano,
    key_values_to_map, time_difference_nano,
};
use super::legacy::convert_old_protocol;
use super::model::{SpanData, SpanEvent, SpanLink, SpanResource, SpanScope, SpanStatus};

/// Why a span was rejected. Rejections drop the span, not the batch.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("missing required span field: {0}")]
    MissingField(&'static str),

    #[error("unparseable timestamp in {field}: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },
}

/// Attribute path carrying the conversation id in the current convention.
const RUN_ID_ATTR: &str = "gen_ai.conversation.id";
/// Pre-convention fallback path.
const OLD_RUN_ID_ATTR: &str = "project.run_id";
/// Correlation key assigned when a span carries neither.
pub const UNKNOWN_RUN_ID: &str = "unknown";

// ============================================================================
// ATTRIBUTE PIPELINE
// ============================================================================

/// Typed key-value decode -> JSON-string recovery -> unflatten, in that
/// fixed order.
fn decode_attribute_tree(attrs: &[KeyValue]) -> JsonValue {
    unflatten(load_json_strings(key_values_to_map(attrs)))
}

fn decode_attribute_tree_json(value: Option<&JsonValue>) -> JsonValue {
    let key_values = value
        .and_then(JsonValue::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[]);
    unflatten(load_json_strings(decode_key_values_json(key_values)))
}

/// Look up the run correlation key in a decoded attribute tree.
pub fn derive_run_id(attributes: &JsonValue) -> String {
    for path in [RUN_ID_ATTR, OLD_RUN_ID_ATTR] {
        if let Some(value) = get_nested_value(attributes, path) {
            match value {
                JsonValue::String(s) if !s.is_empty() => return s.clone(),
                JsonValue::Number(n) => return n.to_string(),
                _ => {}
            }
        }
    }
    UNKNOWN_RUN_ID.to_string()
}

// ============================================================================
// RESOURCE AND SCOPE
// ============================================================================

pub(crate) fn decode_resource(resource: Option<&Resource>, schema_url: &str) -> SpanResource {
    SpanResource {
        attributes: resource
            .map(|r| decode_attribute_tree(&r.attributes))
            .unwrap_or_else(|| JsonValue::Object(Default::default())),
        schema_url: non_empty(schema_url),
    }
}

pub(crate) fn decode_scope(scope: Option<&InstrumentationScope>, schema_url: &str) -> SpanScope {
    match scope {
        Some(scope) => SpanScope {
            name: scope.name.clone(),
            version: scope.version.clone(),
            attributes: decode_attribute_tree(&scope.attributes),
            schema_url: non_empty(schema_url),
        },
        None => SpanScope {
            schema_url: non_empty(schema_url),
            ..Default::default()
        },
    }
}

fn decode_resource_json(resource: Option<&JsonValue>) -> SpanResource {
    SpanResource {
        attributes: decode_attribute_tree_json(resource.and_then(|r| r.get("attributes"))),
        schema_url: resource
            .and_then(|r| r.get("schema_url"))
            .and_then(JsonValue::as_str)
            .and_then(non_empty),
    }
}

fn decode_scope_json(scope: Option<&JsonValue>) -> SpanScope {
    SpanScope {
        name: json_str(scope, "name"),
        version: json_str(scope, "version"),
        attributes: decode_attribute_tree_json(scope.and_then(|s| s.get("attributes"))),
        schema_url: scope
            .and_then(|s| s.get("schema_url"))
            .and_then(JsonValue::as_str)
            .and_then(non_empty),
    }
}

// ============================================================================
// SPAN DECODER — PROST PATH
// ============================================================================

/// Decode one wire span into a `SpanData`.
///
/// Fails closed: identifiers, name, and both timestamps must be present.
/// Pure over its inputs; the caller owns all I/O.
pub fn decode_span(
    span: &Span,
    resource: &SpanResource,
    scope: &SpanScope,
) -> Result<SpanData, DecodeError> {
    if span.trace_id.is_empty() {
        return Err(DecodeError::MissingField("trace_id"));
    }
    if span.span_id.is_empty() {
        return Err(DecodeError::MissingField("span_id"));
    }
    if span.name.is_empty() {
        return Err(DecodeError::MissingField("name"));
    }
    if span.start_time_unix_nano == 0 {
        return Err(DecodeError::MissingField("start_time_unix_nano"));
    }
    if span.end_time_unix_nano == 0 {
        return Err(DecodeError::MissingField("end_time_unix_nano"));
    }

    let start_time_unix_nano = span.start_time_unix_nano.to_string();
    let end_time_unix_nano = span.end_time_unix_nano.to_string();

    let decoded = decode_attribute_tree(&span.attributes);
    let converted = convert_old_protocol(&decoded, &span.name);

    let latency_ns = time_difference_nano(&start_time_unix_nano, &end_time_unix_nano);
    let run_id = derive_run_id(&converted.attributes);

    Ok(SpanData {
        trace_id: decode_identifier(&span.trace_id),
        span_id: decode_identifier(&span.span_id),
        trace_state: non_empty(&span.trace_state),
        parent_span_id: if span.parent_span_id.is_empty() {
            None
        } else {
            Some(decode_identifier(&span.parent_span_id))
        },
        flags: (span.flags != 0).then_some(span.flags),
        name: converted.span_name,
        kind: span.kind,
        start_time_unix_nano,
        end_time_unix_nano,
        attributes: converted.attributes,
        dropped_attributes_count: span.dropped_attributes_count,
        events: span.events.iter().map(decode_event).collect(),
        dropped_events_count: span.dropped_events_count,
        links: span.links.iter().map(decode_link).collect(),
        dropped_links_count: span.dropped_links_count,
        status: span
            .status
            .as_ref()
            .map(|s| SpanStatus {
                code: s.code,
                message: s.message.clone(),
            })
            .unwrap_or_default(),
        resource: resource.clone(),
        scope: scope.clone(),
        run_id,
        latency_ns,
    })
}

fn decode_event(event: &Event) -> SpanEvent {
    SpanEvent {
        name: event.name.clone(),
        time: event.time_unix_nano.to_string(),
        attributes: decode_attribute_tree(&event.attributes),
        dropped_attributes_count: event.dropped_attributes_count,
    }
}

fn decode_link(link: &Link) -> SpanLink {
    SpanLink {
        trace_id: decode_identifier(&link.trace_id),
        span_id: decode_identifier(&link.span_id),
        trace_state: non_empty(&link.trace_state),
        flags: (link.flags != 0).then_some(link.flags),
        attributes: decode_attribute_tree(&link.attributes),
        dropped_attributes_count: link.dropped_attributes_count,
    }
}

// ============================================================================
// SPAN DECODER — LEGACY JSON PATH
// ============================================================================

/// Decode a span from the permissive JSON wire shape.
pub fn decode_span_json(
    span: &JsonValue,
    resource: &SpanResource,
    scope: &SpanScope,
) -> Result<SpanData, DecodeError> {
    let trace_id = decode_identifier_json(span.get("trace_id"));
    if trace_id.is_empty() {
        return Err(DecodeError::MissingField("trace_id"));
    }
    let span_id = decode_identifier_json(span.get("span_id"));
    if span_id.is_empty() {
        return Err(DecodeError::MissingField("span_id"));
    }
    let name = span.get("name").and_then(JsonValue::as_str).unwrap_or("");
    if name.is_empty() {
        return Err(DecodeError::MissingField("name"));
    }

    let start_time_unix_nano = required_timestamp(span, "start_time_unix_nano")?;
    let end_time_unix_nano = required_timestamp(span, "end_time_unix_nano")?;

    let decoded = decode_attribute_tree_json(span.get("attributes"));
    let converted = convert_old_protocol(&decoded, name);

    let latency_ns = time_difference_nano(&start_time_unix_nano, &end_time_unix_nano);
    let run_id = derive_run_id(&converted.attributes);

    let parent_span_id = decode_identifier_json(span.get("parent_span_id"));

    Ok(SpanData {
        trace_id,
        span_id,
        trace_state: span
            .get("trace_state")
            .and_then(JsonValue::as_str)
            .and_then(non_empty),
        parent_span_id: (!parent_span_id.is_empty()).then_some(parent_span_id),
        flags: span
            .get("flags")
            .and_then(JsonValue::as_u64)
            .map(|f| f as u32),
        name: converted.span_name,
        kind: span.get("kind").and_then(JsonValue::as_i64).unwrap_or(0) as i32,
        start_time_unix_nano,
        end_time_unix_nano,
        attributes: converted.attributes,
        dropped_attributes_count: json_u32(span, "dropped_attributes_count"),
        events: span
            .get("events")
            .and_then(JsonValue::as_array)
            .map(|events| events.iter().map(decode_event_json).collect())
            .unwrap_or_default(),
        dropped_events_count: json_u32(span, "dropped_events_count"),
        links: span
            .get("links")
            .and_then(JsonValue::as_array)
            .map(|links| links.iter().map(decode_link_json).collect())
            .unwrap_or_default(),
        dropped_links_count: json_u32(span, "dropped_links_count"),
        status: decode_status_json(span.get("status")),
        resource: resource.clone(),
        scope: scope.clone(),
        run_id,
        latency_ns,
    })
}

/// Field must be present and decode to a parseable integer string. A zero
/// number or an empty string counts as absent, like the protobuf default.
fn required_timestamp(span: &JsonValue, field: &'static str) -> Result<String, DecodeError> {
    let raw = span.get(field);
    let absent = match raw {
        None | Some(JsonValue::Null) => true,
        Some(JsonValue::Number(n)) => n.as_f64() == Some(0.0),
        Some(JsonValue::String(s)) => s.is_empty(),
        _ => false,
    };
    if absent {
        return Err(DecodeError::MissingField(field));
    }
    let decoded = decode_unix_nano(raw);
    if decoded.parse::<i64>().is_err() {
        return Err(DecodeError::InvalidTimestamp {
            field,
            value: decoded,
        });
    }
    Ok(decoded)
}

fn decode_status_json(status: Option<&JsonValue>) -> SpanStatus {
    match status {
        Some(status) => SpanStatus {
            code: status.get("code").and_then(JsonValue::as_i64).unwrap_or(0) as i32,
            message: status
                .get("message")
                .and_then(JsonValue::as_str)
                .unwrap_or("")
                .to_string(),
        },
        None => SpanStatus::default(),
    }
}

fn decode_event_json(event: &JsonValue) -> SpanEvent {
    SpanEvent {
        name: event
            .get("name")
            .and_then(JsonValue::as_str)
            .unwrap_or("")
            .to_string(),
        time: decode_unix_nano(event.get("time_unix_nano")),
        attributes: decode_attribute_tree_json(event.get("attributes")),
        dropped_attributes_count: json_u32(event, "dropped_attributes_count"),
    }
}

fn decode_link_json(link: &JsonValue) -> SpanLink {
    SpanLink {
        trace_id: decode_identifier_json(link.get("trace_id")),
        span_id: decode_identifier_json(link.get("span_id")),
        trace_state: link
            .get("trace_state")
            .and_then(JsonValue::as_str)
            .and_then(non_empty),
        flags: link
            .get("flags")
            .and_then(JsonValue::as_u64)
            .map(|f| f as u32),
        attributes: decode_attribute_tree_json(link.get("attributes")),
        dropped_attributes_count: json_u32(link, "dropped_attributes_count"),
    }
}

// ============================================================================
// BATCH PROCESSORS
// ============================================================================

/// Walk `resource_spans -> scope_spans -> spans`, decoding each span
/// independently. Malformed spans are dropped with a diagnostic; the rest
/// of the batch survives.
pub fn process_export(request: &ExportTraceServiceRequest) -> Vec<SpanData> {
    let mut spans = Vec::new();

    for resource_spans in &request.resource_spans {
        let resource = decode_resource(resource_spans.resource.as_ref(), &resource_spans.schema_url);

        for scope_spans in &resource_spans.scope_spans {
            let scope = decode_scope(scope_spans.scope.as_ref(), &scope_spans.schema_url);

            for span in &scope_spans.spans {
                match decode_span(span, &resource, &scope) {
                    Ok(decoded) => spans.push(decoded),
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            span_name = %span.name,
                            "Dropping malformed span from batch"
                        );
                    }
                }
            }
        }
    }

    spans
}

/// Batch walk over the permissive JSON shape.
///
/// Structurally absent levels are "nothing to do for this branch"; a branch
/// of unexpected shape contributes zero spans and the walk keeps whatever
/// was collected before and after it.
pub fn process_export_json(request: &JsonValue) -> Vec<SpanData> {
    let mut spans = Vec::new();

    let Some(resource_spans_list) = request.get("resource_spans").and_then(JsonValue::as_array)
    else {
        return spans;
    };

    for resource_spans in resource_spans_list {
        let resource = decode_resource_json(resource_spans.get("resource"));

        let Some(scope_spans_list) = resource_spans
            .get("scope_spans")
            .and_then(JsonValue::as_array)
        else {
            continue;
        };

        for scope_spans in scope_spans_list {
            let scope = decode_scope_json(scope_spans.get("scope"));

            let Some(span_list) = scope_spans.get("spans").and_then(JsonValue::as_array) else {
                continue;
            };

            for span in span_list {
                match decode_span_json(span, &resource, &scope) {
                    Ok(decoded) => spans.push(decoded),
                    Err(e) => {
                        tracing::warn!(error = %e, "Dropping malformed span from JSON batch");
                    }
                }
            }
        }
    }

    spans
}

// ============================================================================
// SMALL HELPERS
// ============================================================================

fn non_empty<S: AsRef<str>>(s: S) -> Option<String> {
    let s = s.as_ref();
    (!s.is_empty()).then(|| s.to_string())
}

fn json_str(value: Option<&JsonValue>, key: &str) -> String {
    value
        .and_then(|v| v.get(key))
        .and_then(JsonValue::as_str)
        .unwrap_or("")
        .to_string()
}

fn json_u32(value: &JsonValue, key: &str) -> u32 {
    value.get(key).and_then(JsonValue::as_u64).unwrap_or(0) as u32
}

#[cfg(test)]
#[path = "decode_tests.rs"]
mod tests;
