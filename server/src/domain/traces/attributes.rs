//! Attribute tree reconstruction.
//!
//! Instrumentation SDKs export span attributes as a flat list of dotted keys
//! (`gen_ai.usage.input_tokens`, `gen_ai.request.model`), sometimes with the
//! value itself JSON-encoded into a single string. This module rebuilds the
//! nested attribute tree from that flat form, and provides the inverse.

use serde_json::{Map as JsonMap, Value as JsonValue};

/// Rebuild a nested attribute tree from a flat map with dotted keys.
///
/// Intermediate segments become objects, created on demand. When an
/// intermediate segment was previously assigned a non-object value, it is
/// silently replaced with a fresh object; the flat entry that arrived first
/// loses. Consumers relying on conflicting flat keys get last-writer-wins
/// semantics, pinned by `unflatten_collision_overwrites_scalar` below.
pub fn unflatten(flat: JsonMap<String, JsonValue>) -> JsonValue {
    let mut root = JsonMap::new();
    for (key, value) in flat {
        let mut parts = key.split('.').peekable();
        let mut current = &mut root;
        loop {
            let part = parts.next().expect("split yields at least one segment");
            if parts.peek().is_none() {
                current.insert(part.to_string(), value);
                break;
            }
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| JsonValue::Object(JsonMap::new()));
            if !entry.is_object() {
                *entry = JsonValue::Object(JsonMap::new());
            }
            current = entry.as_object_mut().expect("entry was just made an object");
        }
    }
    JsonValue::Object(root)
}

/// Flatten a nested tree back into dotted keys.
///
/// Only plain objects are descended; arrays (and everything else) are leaf
/// values. An empty object produces no entry at all.
pub fn flatten(tree: &JsonValue) -> JsonMap<String, JsonValue> {
    let mut out = JsonMap::new();
    if let JsonValue::Object(map) = tree {
        flatten_into(map, "", &mut out);
    }
    out
}

fn flatten_into(map: &JsonMap<String, JsonValue>, prefix: &str, out: &mut JsonMap<String, JsonValue>) {
    for (key, value) in map {
        let flat_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            JsonValue::Object(inner) => flatten_into(inner, &flat_key, out),
            other => {
                out.insert(flat_key, other.clone());
            }
        }
    }
}

/// Recover JSON-encoded string values in a flat map.
///
/// Every string value gets one strict parse attempt; on success the parsed
/// value replaces the string, on failure the string stays. Runs after typed
/// key-value decoding and before [`unflatten`], so nested structures that an
/// SDK serialized into a single flat entry are restored before tree assembly.
pub fn load_json_strings(flat: JsonMap<String, JsonValue>) -> JsonMap<String, JsonValue> {
    flat.into_iter()
        .map(|(key, value)| match value {
            JsonValue::String(s) => match serde_json::from_str::<JsonValue>(&s) {
                Ok(parsed) => (key, parsed),
                Err(_) => (key, JsonValue::String(s)),
            },
            other => (key, other),
        })
        .collect()
}

/// Look up a dotted path in a nested tree.
pub fn get_nested_value<'a>(tree: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    let mut current = tree;
    for key in path.split('.') {
        current = current.as_object()?.get(key)?;
    }
    Some(current)
}

/// Dotted-path lookup returning the value as a string, if it is one.
pub fn get_nested_str<'a>(tree: &'a JsonValue, path: &str) -> Option<&'a str> {
    get_nested_value(tree, path).and_then(JsonValue::as_str)
}
