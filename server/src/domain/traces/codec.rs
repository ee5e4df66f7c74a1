//! Wire primitive decoding.
//!
//! Spans reach this server in more than one physical encoding: native
//! protobuf (prost types, over gRPC or OTLP/HTTP), canonical OTLP/JSON, and
//! the looser JSON produced by older protobuf-JS exporters where every value
//! field of the `AnyValue` union is materialized at once and 64-bit integers
//! arrive as `{low, high}` pairs. The decoders here turn all of those into
//! the same canonical scalars.

use opentelemetry_proto::tonic::common::v1::{AnyValue, KeyValue, any_value};
use serde_json::{Map as JsonMap, Value as JsonValue};

// ============================================================================
// IDENTIFIERS
// ============================================================================

/// Hex-encode a binary trace/span identifier. Empty input yields "".
pub fn decode_identifier(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode an identifier from a loose JSON field: hex strings pass through,
/// byte arrays are hex-encoded, anything else is treated as absent.
pub fn decode_identifier_json(value: Option<&JsonValue>) -> String {
    match value {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Array(items)) => {
            let bytes: Vec<u8> = items
                .iter()
                .filter_map(|v| v.as_u64().map(|n| n as u8))
                .collect();
            hex::encode(bytes)
        }
        _ => String::new(),
    }
}

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Normalize a nanosecond timestamp field into its decimal-string form.
///
/// Accepts the shapes that occur in the wild: absent/null (`"0"`), a JSON
/// number, a decimal string (passthrough), or a serialized protobuf Long
/// carrying numeric `low`/`high` halves, reconstructed as
/// `low + high * 2^32`. The Long reconstruction goes through f64 and loses
/// precision above 2^53; stored timestamps that large do not occur in
/// practice and the loss is accepted rather than corrected.
pub fn decode_unix_nano(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => "0".to_string(),
        Some(JsonValue::Number(n)) => {
            if let Some(i) = n.as_i64() {
                i.to_string()
            } else if let Some(u) = n.as_u64() {
                u.to_string()
            } else {
                format!("{:.0}", n.as_f64().unwrap_or(0.0))
            }
        }
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Object(map)) => {
            match (
                map.get("low").and_then(JsonValue::as_f64),
                map.get("high").and_then(JsonValue::as_f64),
            ) {
                (Some(low), Some(high)) => {
                    format!("{:.0}", low + high * 4_294_967_296.0)
                }
                _ => "0".to_string(),
            }
        }
        Some(_) => "0".to_string(),
    }
}

/// Convert an ISO-8601 timestamp (legacy row format) to a nanosecond string.
/// Unparseable input yields "0".
pub fn encode_unix_nano(iso: &str) -> String {
    match chrono::DateTime::parse_from_rfc3339(iso) {
        Ok(dt) => (dt.timestamp_millis() * 1_000_000).to_string(),
        Err(_) => {
            tracing::warn!(ts = iso, "Invalid ISO timestamp in legacy record");
            "0".to_string()
        }
    }
}

/// Signed difference `end - start` over decimal nanosecond strings.
/// Negative results (clock skew) are returned as-is.
pub fn time_difference_nano(start: &str, end: &str) -> i64 {
    let start: i64 = start.parse().unwrap_or(0);
    let end: i64 = end.parse().unwrap_or(0);
    end - start
}

// ============================================================================
// TYPED KEY-VALUES — PROST PATH
// ============================================================================

/// Decode a prost `AnyValue` through its `oneof` discriminator.
///
/// The protobuf binding exposes the union as a proper sum type, so no field
/// presence heuristics are needed on this path. Bytes become hex strings.
pub fn any_value_to_json(value: &AnyValue) -> JsonValue {
    match &value.value {
        Some(any_value::Value::StringValue(s)) => JsonValue::String(s.clone()),
        Some(any_value::Value::BoolValue(b)) => JsonValue::Bool(*b),
        Some(any_value::Value::IntValue(i)) => JsonValue::from(*i),
        Some(any_value::Value::DoubleValue(d)) => {
            serde_json::Number::from_f64(*d).map_or(JsonValue::Null, JsonValue::Number)
        }
        Some(any_value::Value::ArrayValue(arr)) => {
            JsonValue::Array(arr.values.iter().map(any_value_to_json).collect())
        }
        Some(any_value::Value::KvlistValue(kvlist)) => {
            JsonValue::Object(key_values_to_map(&kvlist.values))
        }
        Some(any_value::Value::BytesValue(b)) => JsonValue::String(hex::encode(b)),
        None => JsonValue::Null,
    }
}

/// Flat key → decoded value map from a prost `KeyValue` list.
pub fn key_values_to_map(attrs: &[KeyValue]) -> JsonMap<String, JsonValue> {
    attrs
        .iter()
        .filter_map(|kv| {
            kv.value
                .as_ref()
                .map(|v| (kv.key.clone(), any_value_to_json(v)))
        })
        .collect()
}

// ============================================================================
// TYPED KEY-VALUES — LEGACY JSON PATH
// ============================================================================

/// Decode an `AnyValue` that arrived as loose JSON with every union field
/// materialized at once (protobuf-JS `toObject()` output).
///
/// Two passes, in this exact order. The first pass picks the field whose
/// value differs from its protobuf default (bool true, non-zero int, non-zero
/// double, non-empty string, populated array/kvlist, non-empty bytes). The
/// second pass falls through to plain presence checks so that a field whose
/// value legitimately IS the default — `false`, `0`, `""` — is still
/// recovered. Collapsing this into one pass changes behavior for those
/// values and must not be done.
pub fn decode_any_value_json(value: &JsonValue) -> JsonValue {
    let Some(map) = value.as_object() else {
        return JsonValue::Null;
    };

    if let Some(b) = map.get("bool_value").and_then(JsonValue::as_bool)
        && b
    {
        return JsonValue::Bool(true);
    }
    if let Some(i) = int_field(map.get("int_value"))
        && i != 0
    {
        return JsonValue::from(i);
    }
    if let Some(d) = map.get("double_value").and_then(JsonValue::as_f64)
        && d != 0.0
    {
        return serde_json::Number::from_f64(d).map_or(JsonValue::Null, JsonValue::Number);
    }
    if let Some(s) = map.get("string_value").and_then(JsonValue::as_str)
        && !s.is_empty()
    {
        return JsonValue::String(s.to_string());
    }
    if let Some(values) = map
        .get("array_value")
        .and_then(|a| a.get("values"))
        .and_then(JsonValue::as_array)
    {
        return JsonValue::Array(values.iter().map(decode_any_value_json).collect());
    }
    if let Some(values) = map
        .get("kvlist_value")
        .and_then(|k| k.get("values"))
        .and_then(JsonValue::as_array)
    {
        return JsonValue::Object(decode_key_values_json(values));
    }
    if let Some(bytes) = map.get("bytes_value")
        && !matches!(bytes, JsonValue::Null)
        && bytes.as_array().is_none_or(|a| !a.is_empty())
        && bytes.as_str().is_none_or(|s| !s.is_empty())
    {
        return bytes.clone();
    }

    // Fallthrough: recover legitimately default-valued fields.
    if let Some(i) = int_field(map.get("int_value")) {
        return JsonValue::from(i);
    }
    if let Some(d) = map.get("double_value").and_then(JsonValue::as_f64) {
        return serde_json::Number::from_f64(d).map_or(JsonValue::Null, JsonValue::Number);
    }
    if let Some(s) = map.get("string_value").and_then(JsonValue::as_str) {
        return JsonValue::String(s.to_string());
    }
    if let Some(b) = map.get("bool_value").and_then(JsonValue::as_bool) {
        return JsonValue::Bool(b);
    }
    JsonValue::Null
}

/// 64-bit integers in legacy JSON may themselves be Long objects.
fn int_field(value: Option<&JsonValue>) -> Option<i64> {
    match value {
        Some(JsonValue::Number(n)) => n.as_i64(),
        Some(JsonValue::String(s)) => s.parse().ok(),
        Some(JsonValue::Object(_)) => decode_unix_nano(value).parse().ok(),
        _ => None,
    }
}

/// Flat key → decoded value map from a loose JSON `KeyValue` list.
pub fn decode_key_values_json(key_values: &[JsonValue]) -> JsonMap<String, JsonValue> {
    let mut out = JsonMap::new();
    for kv in key_values {
        let Some(key) = kv.get("key").and_then(JsonValue::as_str) else {
            continue;
        };
        let decoded = kv
            .get("value")
            .map(decode_any_value_json)
            .unwrap_or(JsonValue::Null);
        out.insert(key.to_string(), decoded);
    }
    out
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn identifier_hex_encodes_bytes() {
        assert_eq!(decode_identifier(&[0xde, 0xad, 0xbe, 0xef]), "deadbeef");
        assert_eq!(decode_identifier(&[]), "");
    }

    #[test]
    fn identifier_json_passthrough_and_bytes() {
        assert_eq!(
            decode_identifier_json(Some(&json!("abcd1234"))),
            "abcd1234"
        );
        assert_eq!(decode_identifier_json(Some(&json!([1, 2]))), "0102");
        assert_eq!(decode_identifier_json(None), "");
        assert_eq!(decode_identifier_json(Some(&json!(null))), "");
    }

    #[test]
    fn unix_nano_accepts_every_wire_shape() {
        assert_eq!(decode_unix_nano(None), "0");
        assert_eq!(decode_unix_nano(Some(&json!(null))), "0");
        assert_eq!(decode_unix_nano(Some(&json!(12345))), "12345");
        assert_eq!(decode_unix_nano(Some(&json!("12345"))), "12345");
        assert_eq!(
            decode_unix_nano(Some(&json!({"low": 12345, "high": 0}))),
            "12345"
        );
        assert_eq!(decode_unix_nano(Some(&json!(true))), "0");
        assert_eq!(decode_unix_nano(Some(&json!({"unrelated": 1}))), "0");
    }

    #[test]
    fn unix_nano_long_reconstruction_carries_high_word() {
        // 1_700_000_000_000_000_000 = high 395_812_094, low 908_722_176
        let long = json!({"low": 908_722_176_u32, "high": 395_812_094});
        assert_eq!(decode_unix_nano(Some(&long)), "1700000000000000000");
    }

    #[test]
    fn encode_unix_nano_converts_iso_times() {
        assert_eq!(
            encode_unix_nano("2024-01-01T00:00:00Z"),
            "1704067200000000000"
        );
        assert_eq!(encode_unix_nano("not a timestamp"), "0");
    }

    #[test]
    fn time_difference_is_signed() {
        assert_eq!(time_difference_nano("1000", "2500"), 1500);
        assert_eq!(time_difference_nano("2500", "1000"), -1500);
        assert_eq!(time_difference_nano("garbage", "1000"), 1000);
    }

    #[test]
    fn prost_any_value_decodes_through_oneof() {
        let v = AnyValue {
            value: Some(any_value::Value::IntValue(42)),
        };
        assert_eq!(any_value_to_json(&v), json!(42));

        let v = AnyValue {
            value: Some(any_value::Value::BoolValue(false)),
        };
        assert_eq!(any_value_to_json(&v), json!(false));

        let v = AnyValue {
            value: Some(any_value::Value::BytesValue(vec![0xab])),
        };
        assert_eq!(any_value_to_json(&v), json!("ab"));

        assert_eq!(any_value_to_json(&AnyValue { value: None }), json!(null));
    }

    #[test]
    fn legacy_json_first_pass_picks_non_default_field() {
        let v = json!({"bool_value": false, "int_value": 0, "double_value": 0.0,
                       "string_value": "chat"});
        assert_eq!(decode_any_value_json(&v), json!("chat"));

        let v = json!({"bool_value": true, "string_value": ""});
        assert_eq!(decode_any_value_json(&v), json!(true));

        let v = json!({"bool_value": false, "int_value": 7, "string_value": ""});
        assert_eq!(decode_any_value_json(&v), json!(7));
    }

    #[test]
    fn legacy_json_fallthrough_recovers_default_values() {
        // All fields at their defaults: the first present field in the
        // fallthrough order wins, so a genuine zero survives decoding.
        let v = json!({"bool_value": false, "int_value": 0, "double_value": 0.0,
                       "string_value": ""});
        assert_eq!(decode_any_value_json(&v), json!(0));

        let v = json!({"string_value": ""});
        assert_eq!(decode_any_value_json(&v), json!(""));

        let v = json!({"bool_value": false});
        assert_eq!(decode_any_value_json(&v), json!(false));
    }

    #[test]
    fn legacy_json_decodes_nested_arrays_and_kvlists() {
        let v = json!({
            "bool_value": false, "int_value": 0, "double_value": 0.0, "string_value": "",
            "array_value": {"values": [
                {"int_value": 1},
                {"string_value": "two"},
            ]}
        });
        assert_eq!(decode_any_value_json(&v), json!([1, "two"]));

        let v = json!({
            "kvlist_value": {"values": [
                {"key": "inner", "value": {"int_value": 99}},
            ]}
        });
        assert_eq!(decode_any_value_json(&v), json!({"inner": 99}));
    }

    #[test]
    fn legacy_json_int_accepts_long_objects() {
        let v = json!({"int_value": {"low": 42, "high": 0}});
        assert_eq!(decode_any_value_json(&v), json!(42));
        let v = json!({"int_value": "42"});
        assert_eq!(decode_any_value_json(&v), json!(42));
    }

    #[test]
    fn legacy_json_key_values_build_flat_map() {
        let kvs = json!([
            {"key": "service.name", "value": {"string_value": "api"}},
            {"key": "retries", "value": {"int_value": 0}},
            {"value": {"string_value": "ignored, no key"}},
        ]);
        let map = decode_key_values_json(kvs.as_array().unwrap());
        assert_eq!(map.get("service.name"), Some(&json!("api")));
        assert_eq!(map.get("retries"), Some(&json!(0)));
        assert_eq!(map.len(), 2);
    }
}
