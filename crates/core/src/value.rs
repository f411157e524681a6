//! Dot-path access, lenient type coercion and deep merging over
//! `serde_json::Value` trees.
//!
//! The composed configuration is an ordinary JSON value whose root is an
//! object. All helpers here are total: they return `Option`/defaults
//! instead of panicking, so accessor surfaces built on top of them can
//! guarantee they never raise.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Walk a dot-separated path through nested mappings.
///
/// Any missing segment, or an intermediate value that is not a mapping,
/// yields `None`. Numeric indices into sequences are intentionally not
/// supported.
pub fn get_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        match current {
            Value::Object(map) => current = map.get(segment)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Lenient integer coercion: native integers, floats with no meaningful
/// fraction, and strings in integer syntax all convert.
pub fn as_int_lenient(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64().map(|f| f as i64)
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Lenient float coercion: integers widen, strings in float syntax parse.
pub fn as_float_lenient(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Lenient boolean coercion.
///
/// Accepts native booleans plus the case-insensitive string forms
/// `true|false|yes|no|on|off|1|0` and the numbers 1/0.
pub fn as_bool_lenient(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_i64() {
            Some(1) => Some(true),
            Some(0) => Some(false),
            _ => None,
        },
        Value::String(s) => parse_bool_str(s),
        _ => None,
    }
}

/// Parse the shared boolean string vocabulary used by the INI and
/// environment sources and by accessor coercion.
pub fn parse_bool_str(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Some(true),
        "false" | "no" | "off" | "0" => Some(false),
        _ => None,
    }
}

/// Lenient list coercion: sequences pass through; strings split on commas
/// with whitespace trimmed and empty items dropped.
pub fn as_list_lenient(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => Some(
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(|item| Value::String(item.to_string()))
                .collect(),
        ),
        _ => None,
    }
}

/// Recursively merge `overlay` over `base`.
///
/// Mappings merge key-wise; every other combination (sequences included)
/// is replaced wholesale by the overlay, and an overlay `null` replaces
/// whatever the base held.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.remove(&key) {
                    Some(base_value) => {
                        base_map.insert(key, deep_merge(base_value, overlay_value));
                    }
                    None => {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

/// Merge a sequence of mappings in order; later mappings win.
pub fn merge_all<I>(layers: I) -> Value
where
    I: IntoIterator<Item = Map<String, Value>>,
{
    let mut merged = Value::Object(Map::new());
    for layer in layers {
        merged = deep_merge(merged, Value::Object(layer));
    }
    merged
}

/// Set a value at a dot-separated path, creating intermediate mappings.
///
/// When an intermediate segment holds a non-mapping value, the scalar is
/// preserved under a reserved `"_value"` key rather than discarded.
pub fn set_path(root: &mut Map<String, Value>, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;
    for (i, segment) in segments.iter().enumerate() {
        if i == segments.len() - 1 {
            current.insert(segment.to_string(), value);
            return;
        }
        let entry = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            let displaced = entry.take();
            let mut map = Map::new();
            map.insert("_value".to_string(), displaced);
            *entry = Value::Object(map);
        }
        current = entry.as_object_mut().expect("entry was just made an object");
    }
}

/// Stable SHA-256 digest of a value's canonical JSON form.
///
/// Object keys are emitted in sorted order so structurally equal trees
/// hash identically regardless of insertion order. Used for dynamic
/// source fingerprints and cache keys.
pub fn canonical_hash(value: &Value) -> String {
    let mut encoded = String::new();
    write_canonical(value, &mut encoded);
    let digest = Sha256::digest(encoded.as_bytes());
    hex::encode(digest)
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_path_walks_nested_mappings() {
        let tree = json!({"database": {"credentials": {"user": "admin"}}});
        assert_eq!(
            get_path(&tree, "database.credentials.user"),
            Some(&json!("admin"))
        );
        assert_eq!(get_path(&tree, "database.missing"), None);
        assert_eq!(get_path(&tree, "database.credentials.user.deeper"), None);
    }

    #[test]
    fn int_coercion_accepts_strings_and_floats() {
        assert_eq!(as_int_lenient(&json!(42)), Some(42));
        assert_eq!(as_int_lenient(&json!("42")), Some(42));
        assert_eq!(as_int_lenient(&json!(" -7 ")), Some(-7));
        assert_eq!(as_int_lenient(&json!(3.9)), Some(3));
        assert_eq!(as_int_lenient(&json!("abc")), None);
        assert_eq!(as_int_lenient(&json!({"a": 1})), None);
    }

    #[test]
    fn bool_coercion_vocabulary() {
        for truthy in ["true", "TRUE", "Yes", "on", "1"] {
            assert_eq!(as_bool_lenient(&json!(truthy)), Some(true), "{truthy}");
        }
        for falsy in ["false", "No", "OFF", "0"] {
            assert_eq!(as_bool_lenient(&json!(falsy)), Some(false), "{falsy}");
        }
        assert_eq!(as_bool_lenient(&json!(true)), Some(true));
        assert_eq!(as_bool_lenient(&json!("maybe")), None);
    }

    #[test]
    fn list_coercion_splits_comma_strings() {
        assert_eq!(
            as_list_lenient(&json!("a, b, ,c")),
            Some(vec![json!("a"), json!("b"), json!("c")])
        );
        assert_eq!(
            as_list_lenient(&json!(["x", 1])),
            Some(vec![json!("x"), json!(1)])
        );
        assert_eq!(as_list_lenient(&json!(12)), None);
    }

    #[test]
    fn coercions_are_idempotent() {
        let once = as_list_lenient(&json!("a,b")).unwrap();
        let twice = as_list_lenient(&Value::Array(once.clone())).unwrap();
        assert_eq!(once, twice);

        let b = as_bool_lenient(&json!("yes")).unwrap();
        assert_eq!(as_bool_lenient(&json!(b)), Some(b));
    }

    #[test]
    fn deep_merge_combines_mappings_keywise() {
        let merged = deep_merge(json!({"a": {"x": 1}}), json!({"a": {"y": 2}}));
        assert_eq!(merged, json!({"a": {"x": 1, "y": 2}}));
    }

    #[test]
    fn deep_merge_replaces_sequences_and_scalars() {
        let merged = deep_merge(
            json!({"features": ["a", "b"], "port": 1}),
            json!({"features": ["c"], "port": 2}),
        );
        assert_eq!(merged, json!({"features": ["c"], "port": 2}));
    }

    #[test]
    fn deep_merge_null_overrides() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged, json!({"a": null}));
    }

    #[test]
    fn set_path_preserves_displaced_scalars() {
        let mut root = Map::new();
        set_path(&mut root, "db", json!("sqlite"));
        set_path(&mut root, "db.host", json!("localhost"));
        assert_eq!(
            Value::Object(root),
            json!({"db": {"_value": "sqlite", "host": "localhost"}})
        );
    }

    #[test]
    fn canonical_hash_ignores_key_order() {
        let a = json!({"b": 1, "a": [1, 2]});
        let mut map = Map::new();
        map.insert("a".to_string(), json!([1, 2]));
        map.insert("b".to_string(), json!(1));
        let b = Value::Object(map);
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
        assert_ne!(canonical_hash(&a), canonical_hash(&json!({"a": 1})));
    }
}
