//! Historical row conversion.
//!
//! Rows stored under the previous schema are loosely typed: ISO-8601 times
//! next to nanosecond strings, string status codes next to status objects,
//! attributes as a JSON blob that may still carry the flat protobuf-JS wire
//! shape. Each row is read once during table migration, converted to a
//! canonical `SpanData` through the same legacy-protocol rewrite as live
//! ingestion, and discarded.

use serde_json::{Map as JsonMap, Value as JsonValue, json};
use thiserror::Error;

use super::attributes::{get_nested_value, load_json_strings, unflatten};
use super::codec::{decode_any_value_json, encode_unix_nano, time_difference_nano};
use super::legacy::convert_old_protocol;
use super::model::{SpanData, SpanEvent, SpanResource, SpanScope, SpanStatus};

/// OTLP span kind assigned to all pre-convention string kinds.
const SPAN_KIND_INTERNAL: i32 = 1;

/// Instrumentation identity stamped onto migrated rows, which predate scope
/// tracking.
const LEGACY_SCOPE_NAME: &str = "agentlens";
const LEGACY_SCOPE_VERSION: &str = "1.0.7";

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record has no usable span identifier")]
    MissingSpanId,
}

/// Convert one legacy row (already read into a JSON map) into a `SpanData`.
pub fn convert_record(record: &JsonMap<String, JsonValue>) -> Result<SpanData, RecordError> {
    let raw_attributes = parse_attribute_blob(record.get("attributes"));

    let name = record
        .get("name")
        .and_then(JsonValue::as_str)
        .unwrap_or("")
        .to_string();
    let converted = convert_old_protocol(&raw_attributes, &name);
    let attributes = converted.attributes;
    let name = converted.span_name;

    let kind = decode_kind(record);
    let start_time_unix_nano = decode_time(record, "startTime", "startTimeUnixNano");
    let end_time_unix_nano = decode_time(record, "endTime", "endTimeUnixNano");
    let latency_ns = decode_latency(record, &start_time_unix_nano, &end_time_unix_nano);
    let status = decode_status(record);
    let events = decode_events(record.get("events"));
    // The rewrite consumes the old `project` subtree, so service identity is
    // looked up in the pre-conversion tree.
    let resource = synthesize_resource(&raw_attributes);
    let run_id = decode_run_id(&attributes, record);
    let span_id = decode_span_id(record, &attributes)?;

    Ok(SpanData {
        trace_id: stringify(record.get("traceId")).unwrap_or_default(),
        span_id,
        trace_state: stringify(record.get("traceState")),
        parent_span_id: stringify(record.get("parentSpanId")),
        flags: record
            .get("flags")
            .and_then(JsonValue::as_u64)
            .map(|f| f as u32),
        name,
        kind,
        start_time_unix_nano,
        end_time_unix_nano,
        attributes,
        dropped_attributes_count: 0,
        events,
        dropped_events_count: 0,
        links: vec![],
        dropped_links_count: 0,
        status,
        resource,
        scope: SpanScope {
            name: LEGACY_SCOPE_NAME.to_string(),
            version: LEGACY_SCOPE_VERSION.to_string(),
            attributes: json!({}),
            schema_url: None,
        },
        run_id,
        latency_ns,
    })
}

/// Parse the attributes column: a JSON string or an object, anything else
/// an empty tree. Blobs still in the flat wire shape (dotted keys, or
/// `AnyValue`-union values) are rebuilt through the same pipeline as live
/// ingestion.
fn parse_attribute_blob(value: Option<&JsonValue>) -> JsonValue {
    let parsed = match value {
        Some(JsonValue::String(s)) => {
            serde_json::from_str::<JsonValue>(s).unwrap_or_else(|_| json!({}))
        }
        Some(JsonValue::Object(map)) => JsonValue::Object(map.clone()),
        _ => json!({}),
    };
    let Some(map) = parsed.as_object() else {
        return json!({});
    };

    let is_flat_wire_form =
        map.keys().any(|k| k.contains('.')) || map.values().any(is_any_value_shape);
    if !is_flat_wire_form {
        return parsed;
    }

    let flat: JsonMap<String, JsonValue> = map
        .iter()
        .map(|(key, value)| {
            let decoded = if is_any_value_shape(value) {
                decode_any_value_json(value)
            } else {
                value.clone()
            };
            (key.clone(), decoded)
        })
        .collect();
    unflatten(load_json_strings(flat))
}

fn is_any_value_shape(value: &JsonValue) -> bool {
    const UNION_FIELDS: &[&str] = &[
        "bool_value",
        "int_value",
        "double_value",
        "string_value",
        "array_value",
        "kvlist_value",
        "bytes_value",
    ];
    value
        .as_object()
        .is_some_and(|map| map.keys().any(|k| UNION_FIELDS.contains(&k.as_str())))
}

/// Old string kind (AGENT and friends) maps to INTERNAL; a numeric kind
/// passes through; default INTERNAL.
fn decode_kind(record: &JsonMap<String, JsonValue>) -> i32 {
    if record
        .get("spanKind")
        .and_then(JsonValue::as_str)
        .is_some()
    {
        return SPAN_KIND_INTERNAL;
    }
    record
        .get("kind")
        .and_then(JsonValue::as_i64)
        .map(|k| k as i32)
        .unwrap_or(SPAN_KIND_INTERNAL)
}

/// Old ISO column first, then the nanosecond-string column, then "0".
fn decode_time(record: &JsonMap<String, JsonValue>, iso_key: &str, nano_key: &str) -> String {
    if let Some(iso) = record.get(iso_key).and_then(JsonValue::as_str)
        && !iso.is_empty()
    {
        return encode_unix_nano(iso);
    }
    record
        .get(nano_key)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .unwrap_or_else(|| "0".to_string())
}

/// Old `latencyMs` first (milliseconds), then `latencyNs`, else derived
/// from the converted timestamps.
fn decode_latency(record: &JsonMap<String, JsonValue>, start: &str, end: &str) -> i64 {
    if let Some(ms) = record.get("latencyMs").and_then(JsonValue::as_f64) {
        return (ms * 1_000_000.0) as i64;
    }
    if let Some(ns) = record.get("latencyNs").and_then(JsonValue::as_i64) {
        return ns;
    }
    time_difference_nano(start, end)
}

fn decode_status(record: &JsonMap<String, JsonValue>) -> SpanStatus {
    match record.get("status") {
        // Already an object in the new shape.
        Some(JsonValue::Object(status)) if status.get("code").and_then(JsonValue::as_i64).is_some() => {
            SpanStatus {
                code: status.get("code").and_then(JsonValue::as_i64).unwrap_or(0) as i32,
                message: status
                    .get("message")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("")
                    .to_string(),
            }
        }
        // Old string form, message in its own column.
        Some(JsonValue::String(status)) => SpanStatus {
            code: match status.to_uppercase().as_str() {
                "OK" => 1,
                "ERROR" => 2,
                _ => 0,
            },
            message: record
                .get("statusMessage")
                .and_then(JsonValue::as_str)
                .unwrap_or("")
                .to_string(),
        },
        _ => SpanStatus::default(),
    }
}

/// Events column: JSON string or array. Event time from the old ISO
/// `timestamp`, then `timeUnixNano`, then `time`, else "0".
fn decode_events(value: Option<&JsonValue>) -> Vec<SpanEvent> {
    let events = match value {
        Some(JsonValue::String(s)) => serde_json::from_str::<JsonValue>(s).ok(),
        Some(JsonValue::Array(_)) => value.cloned(),
        _ => None,
    };
    let Some(JsonValue::Array(events)) = events else {
        return vec![];
    };

    events
        .iter()
        .map(|event| {
            let time = if let Some(iso) = event.get("timestamp").and_then(JsonValue::as_str) {
                encode_unix_nano(iso)
            } else {
                event
                    .get("timeUnixNano")
                    .or_else(|| event.get("time"))
                    .and_then(JsonValue::as_str)
                    .unwrap_or("0")
                    .to_string()
            };
            SpanEvent {
                name: event
                    .get("name")
                    .and_then(JsonValue::as_str)
                    .unwrap_or("")
                    .to_string(),
                time,
                attributes: event
                    .get("attributes")
                    .filter(|a| a.is_object())
                    .cloned()
                    .unwrap_or_else(|| json!({})),
                dropped_attributes_count: event
                    .get("droppedAttributesCount")
                    .and_then(JsonValue::as_u64)
                    .unwrap_or(0) as u32,
            }
        })
        .collect()
}

/// Legacy rows stored service identity inside the span attributes; rebuild
/// a resource tree from there.
fn synthesize_resource(attributes: &JsonValue) -> SpanResource {
    let mut resource_attributes = json!({});

    let service_name = get_nested_value(attributes, "service.name")
        .or_else(|| get_nested_value(attributes, "project.service_name"));
    if let Some(service_name) = service_name {
        set_nested(&mut resource_attributes, "service.name", service_name.clone());
    }
    for key in ["service.namespace", "service.version", "service.instance.id"] {
        if let Some(value) = get_nested_value(attributes, key) {
            set_nested(&mut resource_attributes, key, value.clone());
        }
    }

    SpanResource {
        attributes: resource_attributes,
        schema_url: None,
    }
}

fn set_nested(tree: &mut JsonValue, path: &str, value: JsonValue) {
    let mut flat = JsonMap::new();
    flat.insert(path.to_string(), value);
    merge(tree, &unflatten(flat));
}

fn merge(into: &mut JsonValue, from: &JsonValue) {
    if let (Some(into_map), Some(from_map)) = (into.as_object_mut(), from.as_object()) {
        for (key, value) in from_map {
            match into_map.get_mut(key) {
                Some(existing) if existing.is_object() && value.is_object() => {
                    merge(existing, value);
                }
                _ => {
                    into_map.insert(key.clone(), value.clone());
                }
            }
        }
    }
}

fn decode_run_id(attributes: &JsonValue, record: &JsonMap<String, JsonValue>) -> String {
    get_nested_value(attributes, "gen_ai.conversation.id")
        .and_then(value_to_string)
        .or_else(|| get_nested_value(attributes, "project.run_id").and_then(value_to_string))
        .or_else(|| stringify(record.get("runId")))
        .or_else(|| stringify(record.get("run_id")))
        .unwrap_or_else(|| "unknown".to_string())
}

/// The old table's primary key becomes the span identifier; rows carrying
/// no identifier anywhere are unconvertible.
fn decode_span_id(
    record: &JsonMap<String, JsonValue>,
    attributes: &JsonValue,
) -> Result<String, RecordError> {
    stringify(record.get("id"))
        .or_else(|| stringify(record.get("spanId")))
        .or_else(|| get_nested_value(attributes, "span.id").and_then(value_to_string))
        .or_else(|| get_nested_value(attributes, "spanId").and_then(value_to_string))
        .ok_or(RecordError::MissingSpanId)
}

fn stringify(value: Option<&JsonValue>) -> Option<String> {
    value.and_then(value_to_string)
}

fn value_to_string(value: &JsonValue) -> Option<String> {
    match value {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn record(value: JsonValue) -> JsonMap<String, JsonValue> {
        value.as_object().cloned().expect("test record is an object")
    }

    #[test]
    fn converts_a_typical_old_row() {
        let row = record(json!({
            "id": "span-1",
            "traceId": "trace-1",
            "name": "Assistant.reply",
            "spanKind": "AGENT",
            "startTime": "2024-01-01T00:00:00Z",
            "endTime": "2024-01-01T00:00:01Z",
            "status": "OK",
            "attributes": "{\"project\": {\"run_id\": \"run-5\", \"service_name\": \"demo\"}, \
                            \"span\": {\"kind\": \"AGENT\"}, \
                            \"metadata\": {\"name\": \"assistant\"}}",
        }));

        let span = convert_record(&row).unwrap();
        assert_eq!(span.span_id, "span-1");
        assert_eq!(span.trace_id, "trace-1");
        assert_eq!(span.name, "invoke_agent assistant");
        assert_eq!(span.kind, 1);
        assert_eq!(span.start_time_unix_nano, "1704067200000000000");
        assert_eq!(span.end_time_unix_nano, "1704067201000000000");
        assert_eq!(span.latency_ns, 1_000_000_000);
        assert_eq!(span.status.code, 1);
        assert_eq!(span.run_id, "run-5");
        assert_eq!(
            span.resource.attributes,
            json!({"service": {"name": "demo"}})
        );
        assert_eq!(span.scope.name, "agentlens");
    }

    #[test]
    fn missing_span_id_is_an_error() {
        let row = record(json!({"name": "orphan", "attributes": "{}"}));
        assert!(matches!(
            convert_record(&row),
            Err(RecordError::MissingSpanId)
        ));
    }

    #[test]
    fn span_id_falls_back_to_attributes() {
        let row = record(json!({
            "name": "from-attrs",
            "attributes": {"span": {"id": "attr-span-9"}},
        }));
        let span = convert_record(&row).unwrap();
        assert_eq!(span.span_id, "attr-span-9");
    }

    #[test]
    fn latency_prefers_old_milliseconds_column() {
        let row = record(json!({
            "id": "s", "name": "n", "attributes": {},
            "latencyMs": 2.5,
            "startTimeUnixNano": "1000",
            "endTimeUnixNano": "2000",
        }));
        let span = convert_record(&row).unwrap();
        assert_eq!(span.latency_ns, 2_500_000);

        let row = record(json!({
            "id": "s", "name": "n", "attributes": {},
            "latencyNs": 777,
        }));
        assert_eq!(convert_record(&row).unwrap().latency_ns, 777);

        let row = record(json!({
            "id": "s", "name": "n", "attributes": {},
            "startTimeUnixNano": "1000",
            "endTimeUnixNano": "2500",
        }));
        assert_eq!(convert_record(&row).unwrap().latency_ns, 1500);
    }

    #[test]
    fn status_variants_decode() {
        let row = record(json!({
            "id": "s", "name": "n", "attributes": {},
            "status": "error", "statusMessage": "timeout",
        }));
        let status = convert_record(&row).unwrap().status;
        assert_eq!(status.code, 2);
        assert_eq!(status.message, "timeout");

        let row = record(json!({
            "id": "s", "name": "n", "attributes": {},
            "status": {"code": 1, "message": "fine"},
        }));
        let status = convert_record(&row).unwrap().status;
        assert_eq!(status.code, 1);
        assert_eq!(status.message, "fine");

        let row = record(json!({"id": "s", "name": "n", "attributes": {}}));
        assert_eq!(convert_record(&row).unwrap().status, SpanStatus::default());
    }

    #[test]
    fn events_decode_from_json_string_with_iso_times() {
        let row = record(json!({
            "id": "s", "name": "n", "attributes": {},
            "events": "[{\"name\": \"retry\", \"timestamp\": \"2024-01-01T00:00:00Z\"}, \
                        {\"name\": \"tick\", \"timeUnixNano\": \"123\"}]",
        }));
        let events = convert_record(&row).unwrap().events;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].time, "1704067200000000000");
        assert_eq!(events[1].time, "123");

        let row = record(json!({
            "id": "s", "name": "n", "attributes": {},
            "events": "not json",
        }));
        assert!(convert_record(&row).unwrap().events.is_empty());
    }

    #[test]
    fn flat_wire_blobs_are_rebuilt() {
        // Attributes stored as the flat protobuf-JS dump: dotted keys with
        // AnyValue-shaped values, one of them JSON-encoded.
        let row = record(json!({
            "id": "s", "name": "n",
            "attributes": {
                "gen_ai.request.model": {"string_value": "\"gpt-x\""},
                "gen_ai.usage.input_tokens": {"int_value": {"low": 42, "high": 0}},
            },
        }));
        let span = convert_record(&row).unwrap();
        assert_eq!(
            span.attributes,
            json!({
                "gen_ai": {
                    "request": {"model": "gpt-x"},
                    "usage": {"input_tokens": 42},
                }
            })
        );
    }

    #[test]
    fn unparseable_attribute_blob_becomes_empty_tree() {
        let row = record(json!({
            "id": "s", "name": "n", "attributes": "{{nope",
        }));
        let span = convert_record(&row).unwrap();
        // The legacy rewrite still runs over the empty tree.
        assert_eq!(
            get_nested_value(&span.attributes, "gen_ai.operation.name"),
            Some(&json!("unknown"))
        );
    }

    #[test]
    fn run_id_falls_back_to_record_columns() {
        let row = record(json!({
            "id": "s", "name": "n", "attributes": {}, "runId": "row-run",
        }));
        assert_eq!(convert_record(&row).unwrap().run_id, "row-run");

        let row = record(json!({"id": "s", "name": "n", "attributes": {}}));
        assert_eq!(convert_record(&row).unwrap().run_id, "unknown");
    }
}
