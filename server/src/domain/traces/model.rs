//! Canonical span records.
//!
//! `SpanData` is the transport-agnostic unit of record: every inbound span,
//! whether it arrived over gRPC, OTLP/HTTP, or out of a historical table
//! during migration, is decoded into this shape exactly once and never
//! mutated afterwards. Timestamps are kept as decimal nanosecond strings to
//! preserve the full 64-bit range through JSON serialization.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

fn empty_tree() -> JsonValue {
    JsonValue::Object(serde_json::Map::new())
}

/// One decoded span, with its resource and instrumentation scope attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanData {
    pub trace_id: String,
    pub span_id: String,
    pub trace_state: Option<String>,
    /// Absent for root spans.
    pub parent_span_id: Option<String>,
    pub flags: Option<u32>,
    pub name: String,
    /// OTLP span kind (0 unspecified through 5 consumer).
    pub kind: i32,
    pub start_time_unix_nano: String,
    pub end_time_unix_nano: String,
    /// Nested attribute tree reconstructed from the flattened wire form.
    pub attributes: JsonValue,
    pub dropped_attributes_count: u32,
    pub events: Vec<SpanEvent>,
    pub dropped_events_count: u32,
    pub links: Vec<SpanLink>,
    pub dropped_links_count: u32,
    pub status: SpanStatus,
    pub resource: SpanResource,
    pub scope: SpanScope,
    /// Conversation correlation key; the literal "unknown" when the span
    /// carries no conversation attribute.
    pub run_id: String,
    /// `end - start`. Negative when the emitting clock disagrees with
    /// itself; stored as-is.
    pub latency_ns: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    pub name: String,
    /// Nanosecond timestamp, decimal string.
    pub time: String,
    #[serde(default = "empty_tree")]
    pub attributes: JsonValue,
    #[serde(default)]
    pub dropped_attributes_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanLink {
    pub trace_id: String,
    pub span_id: String,
    pub trace_state: Option<String>,
    pub flags: Option<u32>,
    #[serde(default = "empty_tree")]
    pub attributes: JsonValue,
    #[serde(default)]
    pub dropped_attributes_count: u32,
}

/// `{code: 0 unset | 1 ok | 2 error, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanStatus {
    pub code: i32,
    pub message: String,
}

impl Default for SpanStatus {
    fn default() -> Self {
        Self {
            code: 0,
            message: String::new(),
        }
    }
}

/// Attributes of the process/service that emitted the span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanResource {
    #[serde(default = "empty_tree")]
    pub attributes: JsonValue,
    pub schema_url: Option<String>,
}

impl Default for SpanResource {
    fn default() -> Self {
        Self {
            attributes: empty_tree(),
            schema_url: None,
        }
    }
}

/// Identity of the instrumentation library that produced the span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanScope {
    pub name: String,
    pub version: String,
    #[serde(default = "empty_tree")]
    pub attributes: JsonValue,
    pub schema_url: Option<String>,
}

impl Default for SpanScope {
    fn default() -> Self {
        Self {
            name: String::new(),
            version: String::new(),
            attributes: empty_tree(),
            schema_url: None,
        }
    }
}
