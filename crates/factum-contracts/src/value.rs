//! Dot-path navigation helpers over dynamically shaped JSON documents.
//!
//! Documents under validation have no fixed schema — they are arbitrary
//! trees of objects, arrays, and scalars addressed by dot-separated paths
//! (e.g. `"user.hours"`). Every crate in the workspace navigates them
//! through these helpers rather than hand-rolling traversal.

use serde_json::Value;

/// Resolve a dot-notation path (e.g. `"patient.id"`) against a JSON value.
///
/// Returns `None` when any segment is missing or the resolved value is JSON
/// `null` — an explicit null is treated the same as an absent field
/// throughout the pipeline.
pub fn get_path<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        match current.get(segment) {
            Some(v) if !v.is_null() => current = v,
            _ => return None,
        }
    }
    Some(current)
}

/// Assign `new` at the dot-notation `path`, creating intermediate objects
/// as needed.
///
/// A non-object intermediate (scalar or array standing where the path needs
/// an object) is replaced with an empty object so the write always lands.
pub fn set_path(value: &mut Value, path: &str, new: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = value;
    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(serde_json::Map::new());
        }
        let Value::Object(map) = current else {
            return;
        };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if !current.is_object() {
        *current = Value::Object(serde_json::Map::new());
    }
    if let Value::Object(map) = current {
        map.insert(segments[segments.len() - 1].to_string(), new);
    }
}

/// Coerce a JSON value to `f64`.
///
/// Numbers coerce directly; strings are parsed (`"123.5"` → `123.5`).
/// Booleans, nulls, arrays, and objects are not numbers.
pub fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Flatten all numeric fields of a JSON object into `(dot_path, value)`
/// pairs, recursing into nested objects.
///
/// Arrays are not descended and booleans are not numbers — this mirrors the
/// field set the anomaly heuristics are defined over.
pub fn numeric_fields(value: &Value) -> Vec<(String, f64)> {
    let mut out = Vec::new();
    collect_numeric(value, "", &mut out);
    out
}

fn collect_numeric(value: &Value, prefix: &str, out: &mut Vec<(String, f64)>) {
    let Some(map) = value.as_object() else {
        return;
    };
    for (key, v) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match v {
            Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    out.push((path, f));
                }
            }
            Value::Object(_) => collect_numeric(v, &path, out),
            _ => {}
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
