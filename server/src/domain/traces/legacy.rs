//! Legacy instrumentation protocol rewrite.
//!
//! SDKs older than the `gen_ai.*` semantic-convention rollout emitted spans
//! with a different attribute layout: the conversation key under
//! `project.run_id`, raw call data under flat `input`/`metadata`/`output`
//! subtrees, and a string span kind under `span.kind`. This module rewrites
//! such attribute trees into the current convention so that downstream
//! projection and queries treat old and new spans uniformly. Applied both to
//! live spans from old SDKs and to historical rows during table migration.

use serde_json::{Map as JsonMap, Value as JsonValue, json};

use super::attributes::get_nested_value;

/// Span kinds used by the pre-convention instrumentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OldSpanKind {
    Agent,
    Tool,
    Llm,
    Embedding,
    Formatter,
    Common,
}

impl OldSpanKind {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "AGENT" => Some(Self::Agent),
            "TOOL" => Some(Self::Tool),
            "LLM" => Some(Self::Llm),
            "EMBEDDING" => Some(Self::Embedding),
            "FORMATTER" => Some(Self::Formatter),
            "COMMON" => Some(Self::Common),
            _ => None,
        }
    }
}

/// Result of a protocol rewrite: the new-convention attribute tree plus the
/// (possibly renamed) span name.
#[derive(Debug, Clone, PartialEq)]
pub struct LegacyConversion {
    pub attributes: JsonValue,
    pub span_name: String,
}

/// Rewrite an old-convention attribute tree into the current `gen_ai.*`
/// shape.
///
/// Detection is by presence of a `gen_ai` subtree: spans that already carry
/// it pass through untouched, even when mixed with leftover old keys. The
/// rewrite itself is a fixed key table:
///
/// - `project.run_id` -> `gen_ai.conversation.id`
/// - `input` / `metadata` / `output` -> `agentlens.function.*`
/// - `output.usage.{input_tokens,output_tokens}` -> `gen_ai.usage.*`
/// - `span.kind` string -> `gen_ai.operation.name`, renaming the span for
///   the kinds that carry a display name in their metadata
/// - every key outside the old convention's namespaces passes through
///   unchanged
pub fn convert_old_protocol(attributes: &JsonValue, span_name: &str) -> LegacyConversion {
    let Some(old_map) = attributes.as_object() else {
        return LegacyConversion {
            attributes: JsonValue::Object(JsonMap::new()),
            span_name: span_name.to_string(),
        };
    };

    if get_nested_value(attributes, "gen_ai").is_some() {
        return LegacyConversion {
            attributes: attributes.clone(),
            span_name: span_name.to_string(),
        };
    }

    let mut new_attributes = json!({
        "gen_ai": {
            "conversation": {},
            "request": {},
            "operation": {},
        },
        "agentlens": {
            "function": {
                "input": {},
                "metadata": {},
                "output": {},
            }
        }
    });

    set_path(&mut new_attributes, &["agentlens", "function", "name"], json!(span_name));

    if let Some(run_id) = get_nested_value(attributes, "project.run_id") {
        set_path(
            &mut new_attributes,
            &["gen_ai", "conversation", "id"],
            run_id.clone(),
        );
    }

    let metadata = get_nested_value(attributes, "metadata").cloned();

    if let Some(input) = get_nested_value(attributes, "input") {
        set_path(
            &mut new_attributes,
            &["agentlens", "function", "input"],
            input.clone(),
        );
    }
    if let Some(metadata_value) = &metadata {
        set_path(
            &mut new_attributes,
            &["agentlens", "function", "metadata"],
            metadata_value.clone(),
        );
    }
    if let Some(output) = get_nested_value(attributes, "output") {
        set_path(
            &mut new_attributes,
            &["agentlens", "function", "output"],
            output.clone(),
        );
        if let Some(usage) = output.get("usage").filter(|u| u.is_object()) {
            set_path(
                &mut new_attributes,
                &["gen_ai", "usage", "input_tokens"],
                usage.get("input_tokens").cloned().unwrap_or(JsonValue::Null),
            );
            set_path(
                &mut new_attributes,
                &["gen_ai", "usage", "output_tokens"],
                usage.get("output_tokens").cloned().unwrap_or(JsonValue::Null),
            );
        }
    }

    let old_kind = get_nested_value(attributes, "span.kind")
        .and_then(JsonValue::as_str)
        .and_then(OldSpanKind::parse);

    let (operation, renamed) = match old_kind {
        Some(OldSpanKind::Agent) => ("invoke_agent", Some(metadata_str(&metadata, "name"))),
        Some(OldSpanKind::Tool) => ("execute_tool", Some(metadata_str(&metadata, "name"))),
        Some(OldSpanKind::Llm) => ("chat", Some(metadata_str(&metadata, "model_name"))),
        Some(OldSpanKind::Embedding) => ("embedding", Some(metadata_str(&metadata, "model_name"))),
        Some(OldSpanKind::Formatter) => ("format", None),
        Some(OldSpanKind::Common) | None => ("unknown", None),
    };
    set_path(
        &mut new_attributes,
        &["gen_ai", "operation", "name"],
        json!(operation),
    );

    // Keys the old convention did not own are carried over as-is.
    const CONSUMED: &[&str] = &["project", "input", "metadata", "output", "span"];
    for (key, value) in old_map {
        if !CONSUMED.contains(&key.as_str()) {
            set_path(&mut new_attributes, &[key.as_str()], value.clone());
        }
    }

    let span_name = match renamed {
        Some(suffix) => format!("{operation} {suffix}"),
        None => span_name.to_string(),
    };

    LegacyConversion {
        attributes: new_attributes,
        span_name,
    }
}

fn metadata_str(metadata: &Option<JsonValue>, key: &str) -> String {
    metadata
        .as_ref()
        .and_then(|m| m.get(key))
        .and_then(JsonValue::as_str)
        .unwrap_or("")
        .to_string()
}

fn set_path(tree: &mut JsonValue, path: &[&str], value: JsonValue) {
    let mut current = tree;
    let (last, intermediate) = path.split_last().expect("path is never empty");
    for key in intermediate {
        current = current
            .as_object_mut()
            .expect("rewrite skeleton is all objects")
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(JsonMap::new()));
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn new_convention_passes_through_unchanged() {
        let attributes = json!({
            "gen_ai": {"operation": {"name": "chat"}},
            "input": {"stale": true},
        });
        let converted = convert_old_protocol(&attributes, "chat gpt-x");
        assert_eq!(converted.attributes, attributes);
        assert_eq!(converted.span_name, "chat gpt-x");
    }

    #[test]
    fn agent_span_is_rewritten_and_renamed() {
        let attributes = json!({
            "project": {"run_id": "run-42"},
            "span": {"kind": "AGENT"},
            "input": {"query": "hi"},
            "metadata": {"name": "planner"},
        });
        let converted = convert_old_protocol(&attributes, "Planner.reply");

        assert_eq!(converted.span_name, "invoke_agent planner");
        assert_eq!(
            get_nested_value(&converted.attributes, "gen_ai.conversation.id"),
            Some(&json!("run-42"))
        );
        assert_eq!(
            get_nested_value(&converted.attributes, "gen_ai.operation.name"),
            Some(&json!("invoke_agent"))
        );
        assert_eq!(
            get_nested_value(&converted.attributes, "agentlens.function.input"),
            Some(&json!({"query": "hi"}))
        );
        assert_eq!(
            get_nested_value(&converted.attributes, "agentlens.function.name"),
            Some(&json!("Planner.reply"))
        );
    }

    #[test]
    fn llm_span_lifts_usage_and_renames_by_model() {
        let attributes = json!({
            "span": {"kind": "LLM"},
            "metadata": {"model_name": "gpt-x"},
            "output": {
                "text": "hello",
                "usage": {"input_tokens": 100, "output_tokens": 50},
            },
        });
        let converted = convert_old_protocol(&attributes, "ModelCall");

        assert_eq!(converted.span_name, "chat gpt-x");
        assert_eq!(
            get_nested_value(&converted.attributes, "gen_ai.usage.input_tokens"),
            Some(&json!(100))
        );
        assert_eq!(
            get_nested_value(&converted.attributes, "gen_ai.usage.output_tokens"),
            Some(&json!(50))
        );
        assert_eq!(
            get_nested_value(&converted.attributes, "agentlens.function.output.text"),
            Some(&json!("hello"))
        );
    }

    #[test]
    fn formatter_keeps_original_name() {
        let attributes = json!({"span": {"kind": "FORMATTER"}});
        let converted = convert_old_protocol(&attributes, "format_prompt");
        assert_eq!(converted.span_name, "format_prompt");
        assert_eq!(
            get_nested_value(&converted.attributes, "gen_ai.operation.name"),
            Some(&json!("format"))
        );
    }

    #[test]
    fn unknown_kind_defaults_operation() {
        let attributes = json!({"span": {"kind": "COMMON"}});
        let converted = convert_old_protocol(&attributes, "helper");
        assert_eq!(converted.span_name, "helper");
        assert_eq!(
            get_nested_value(&converted.attributes, "gen_ai.operation.name"),
            Some(&json!("unknown"))
        );

        let converted = convert_old_protocol(&json!({}), "bare");
        assert_eq!(
            get_nested_value(&converted.attributes, "gen_ai.operation.name"),
            Some(&json!("unknown"))
        );
    }

    #[test]
    fn unowned_keys_pass_through() {
        let attributes = json!({
            "span": {"kind": "TOOL"},
            "metadata": {"name": "search"},
            "http": {"method": "GET"},
            "retries": 3,
        });
        let converted = convert_old_protocol(&attributes, "search");
        assert_eq!(
            get_nested_value(&converted.attributes, "http.method"),
            Some(&json!("GET"))
        );
        assert_eq!(
            get_nested_value(&converted.attributes, "retries"),
            Some(&json!(3))
        );
        // Consumed namespaces do not leak through in their old shape.
        assert_eq!(get_nested_value(&converted.attributes, "span.kind"), None);
    }

    #[test]
    fn rename_with_missing_metadata_keeps_operation_prefix() {
        // No metadata.name: the rename still applies, with an empty suffix.
        let attributes = json!({"span": {"kind": "TOOL"}});
        let converted = convert_old_protocol(&attributes, "tool_call");
        assert_eq!(converted.span_name, "execute_tool ");
    }

    #[test]
    fn non_object_attributes_become_empty_tree() {
        let converted = convert_old_protocol(&json!(null), "span");
        assert_eq!(converted.attributes, json!({}));
        assert_eq!(converted.span_name, "span");
    }

    #[test]
    fn conversion_is_stable_under_repeated_application() {
        let attributes = json!({
            "project": {"run_id": "run-1"},
            "span": {"kind": "LLM"},
            "metadata": {"model_name": "gpt-x"},
        });
        let once = convert_old_protocol(&attributes, "call");
        // The first rewrite introduced gen_ai, so a second pass is identity.
        let twice = convert_old_protocol(&once.attributes, &once.span_name);
        assert_eq!(once, twice);
    }
}
