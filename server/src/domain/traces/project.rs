//! Row projection.
//!
//! Derives the indexed scalar columns of the persisted span row from a
//! decoded `SpanData`. Every derivation tolerates absence; the projection is
//! recomputable at any time from the canonical record, so these columns are
//! an index, not a second source of truth.

use serde_json::Value as JsonValue;

use super::attributes::{get_nested_str, get_nested_value};
use super::model::SpanData;

/// The persisted span row: the canonical record plus its derived scalar
/// columns.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanRow {
    pub span: SpanData,
    pub status_code: i32,
    pub service_name: Option<String>,
    pub operation_name: Option<String>,
    pub instrumentation_name: Option<String>,
    pub instrumentation_version: Option<String>,
    pub model: Option<String>,
    pub input_tokens: Option<i64>,
    pub output_tokens: Option<i64>,
    pub total_tokens: Option<i64>,
}

/// Project a `SpanData` into its persisted row shape.
pub fn project_row(span: SpanData) -> SpanRow {
    let service_name = get_nested_str(&span.resource.attributes, "service.name").map(String::from);
    let operation_name =
        get_nested_str(&span.attributes, "gen_ai.operation.name").map(String::from);
    let instrumentation_name = get_nested_str(&span.scope.attributes, "server.name")
        .map(String::from)
        .or_else(|| non_empty(&span.scope.name));
    let instrumentation_version = get_nested_str(&span.scope.attributes, "server.version")
        .map(String::from)
        .or_else(|| non_empty(&span.scope.version));
    let model = get_nested_str(&span.attributes, "gen_ai.request.model").map(String::from);
    let input_tokens = token_count(&span.attributes, "gen_ai.usage.input_tokens");
    let output_tokens = token_count(&span.attributes, "gen_ai.usage.output_tokens");
    let total_tokens = calculate_total_tokens(input_tokens, output_tokens);
    let status_code = span.status.code;

    SpanRow {
        span,
        status_code,
        service_name,
        operation_name,
        instrumentation_name,
        instrumentation_version,
        model,
        input_tokens,
        output_tokens,
        total_tokens,
    }
}

/// Numeric only; a stringly-typed count that survived JSON recovery as text
/// is not trusted.
fn token_count(attributes: &JsonValue, path: &str) -> Option<i64> {
    get_nested_value(attributes, path).and_then(JsonValue::as_i64)
}

/// Sum when both are present, the single present one otherwise, absent when
/// neither is.
pub fn calculate_total_tokens(input: Option<i64>, output: Option<i64>) -> Option<i64> {
    match (input, output) {
        (Some(input), Some(output)) => Some(input + output),
        (Some(input), None) => Some(input),
        (None, Some(output)) => Some(output),
        (None, None) => None,
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}
