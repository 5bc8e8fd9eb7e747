//! Canonical JSON encoding.
//!
//! Rules:
//! 1. UTF-8, no whitespace
//! 2. Object keys sorted lexicographically by byte order
//! 3. Arrays preserve order
//! 4. Numbers are written exactly as given; callers guarantee integers by
//!    running [`validate`](crate::validation::validate) first
//! 5. Absent fields are omitted, never written as `null`
//!
//! The encoder sorts keys itself instead of relying on the map type behind
//! [`serde_json::Map`], so enabling `preserve_order` anywhere in the
//! dependency graph cannot change a digest.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ErrorSeverity, SimError};

/// A typed value could not be lowered into a JSON value tree.
///
/// Only reachable for types serde_json cannot represent, such as maps keyed
/// by structs.
#[derive(Debug, thiserror::Error)]
#[error("value cannot be canonically encoded: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

impl SimError for EncodeError {
    fn severity(&self) -> ErrorSeverity {
        ErrorSeverity::Internal
    }

    fn error_code(&self) -> &'static str {
        "encode"
    }
}

/// Encodes a JSON value tree into its canonical string form.
pub fn encode(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

/// Lowers any serializable value into a JSON tree and encodes it canonically.
pub fn canonical_json<T>(value: &T) -> Result<String, EncodeError>
where
    T: Serialize + ?Sized,
{
    let tree = serde_json::to_value(value)?;
    Ok(encode(&tree))
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(true) => out.push_str("true"),
        Value::Bool(false) => out.push_str("false"),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => write_string(text, out),
        Value::Array(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (index, (key, item)) in entries.into_iter().enumerate() {
                if index > 0 {
                    out.push(',');
                }
                write_string(key, out);
                out.push(':');
                write_value(item, out);
            }
            out.push('}');
        }
    }
}

/// Writes a JSON string literal using the minimal escape set.
fn write_string(text: &str, out: &mut String) {
    const HEX: &[u8; 16] = b"0123456789abcdef";

    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => {
                let code = c as usize;
                out.push_str("\\u00");
                out.push(HEX[code >> 4] as char);
                out.push(HEX[code & 0xf] as char);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct Forward {
        alpha: u32,
        beta: &'static str,
        gamma: Vec<u32>,
    }

    #[derive(Serialize)]
    struct Backward {
        gamma: Vec<u32>,
        beta: &'static str,
        alpha: u32,
    }

    #[test]
    fn field_declaration_order_is_ignored() {
        let a = canonical_json(&Forward {
            alpha: 1,
            beta: "b",
            gamma: vec![3, 2, 1],
        })
        .unwrap();
        let b = canonical_json(&Backward {
            gamma: vec![3, 2, 1],
            beta: "b",
            alpha: 1,
        })
        .unwrap();

        assert_eq!(a, b);
        assert_eq!(a, r#"{"alpha":1,"beta":"b","gamma":[3,2,1]}"#);
    }

    #[test]
    fn nested_objects_are_sorted_and_compact() {
        let value = json!({ "z": { "b": [1, { "y": true, "x": false }], "a": "s" }, "a": -4 });
        assert_eq!(
            encode(&value),
            r#"{"a":-4,"z":{"a":"s","b":[1,{"x":false,"y":true}]}}"#
        );
    }

    #[test]
    fn keys_sort_by_bytes_not_case_folding() {
        let value = json!({ "b": 1, "B": 2, "a": 3, "_": 4 });
        assert_eq!(encode(&value), r#"{"B":2,"_":4,"a":3,"b":1}"#);
    }

    #[test]
    fn strings_escape_like_json_stringify() {
        let value = json!("quote\" slash\\ tab\t nl\n bell\u{07} é");
        assert_eq!(
            encode(&value),
            "\"quote\\\" slash\\\\ tab\\t nl\\n bell\\u0007 é\""
        );
    }

    #[test]
    fn skipped_options_leave_no_trace() {
        #[derive(Serialize)]
        struct Sparse {
            #[serde(skip_serializing_if = "Option::is_none")]
            note: Option<String>,
            id: u8,
        }

        let encoded = canonical_json(&Sparse { note: None, id: 7 }).unwrap();
        assert_eq!(encoded, r#"{"id":7}"#);
    }

    proptest! {
        #[test]
        fn insertion_order_never_changes_output(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i32>(), 0..12),
            rotate in 0usize..12,
        ) {
            let ordered: Vec<(String, i32)> = entries.into_iter().collect();
            let mut rotated = ordered.clone();
            if !rotated.is_empty() {
                let by = rotate % rotated.len();
                rotated.rotate_left(by);
            }
            rotated.reverse();

            let mut first = serde_json::Map::new();
            for (k, v) in &ordered {
                first.insert(k.clone(), json!(v));
            }
            let mut second = serde_json::Map::new();
            for (k, v) in &rotated {
                second.insert(k.clone(), json!(v));
            }

            prop_assert_eq!(encode(&Value::Object(first)), encode(&Value::Object(second)));
        }
    }
}
