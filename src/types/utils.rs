//! Shared utility functions for payload access and common operations.
//!
//! ## JSON Extraction Helpers
//!
//! Ergonomic helpers for reading `serde_json::Value` payloads that arrived
//! from a model or a remote store, where any key may be absent or carry the
//! wrong type. Accessors never fail; they substitute the caller's default:
//! - `json_string`, `json_string_or` - Extract strings
//! - `json_string_array` - Extract string arrays
//! - `json_bool`, `json_i64`, `json_f64` - Extract primitives
//! - `json_array`, `json_object` - Extract nested structures

// =============================================================================
// JSON Value Extraction Helpers
// =============================================================================

/// Extract string from JSON value by key.
///
/// Replaces verbose `v.get("key")?.as_str()?.to_string()` patterns.
#[inline]
pub fn json_string(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key)?.as_str().map(String::from)
}

/// Extract string with default value.
#[inline]
pub fn json_string_or(value: &serde_json::Value, key: &str, default: &str) -> String {
    json_string(value, key).unwrap_or_else(|| default.to_string())
}

/// Extract string array from JSON value by key.
#[inline]
pub fn json_string_array(value: &serde_json::Value, key: &str) -> Vec<String> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s.as_str().map(String::from))
                .collect()
        })
        .unwrap_or_default()
}

/// Extract boolean with default.
#[inline]
pub fn json_bool(value: &serde_json::Value, key: &str, default: bool) -> bool {
    value.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

/// Extract i64 with default.
#[inline]
pub fn json_i64(value: &serde_json::Value, key: &str, default: i64) -> i64 {
    value.get(key).and_then(|v| v.as_i64()).unwrap_or(default)
}

/// Extract f64 with default.
#[inline]
pub fn json_f64(value: &serde_json::Value, key: &str, default: f64) -> f64 {
    value.get(key).and_then(|v| v.as_f64()).unwrap_or(default)
}

/// Extract a nested array, empty when missing or mismatched.
#[inline]
pub fn json_array(value: &serde_json::Value, key: &str) -> Vec<serde_json::Value> {
    value
        .get(key)
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Extract a nested object, empty when missing or mismatched.
#[inline]
pub fn json_object(
    value: &serde_json::Value,
    key: &str,
) -> serde_json::Map<String, serde_json::Value> {
    value
        .get(key)
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default()
}

// =============================================================================
// String Utilities
// =============================================================================

/// Capitalize the first character of a string.
/// Used for formatting goal statements inside prompts.
#[inline]
pub fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        None => String::new(),
        Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// First `max_chars` characters of the trimmed input.
/// Keeps error messages bounded when quoting response bodies.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.chars().count() <= max_chars {
        trimmed.to_string()
    } else {
        trimmed.chars().take(max_chars).collect()
    }
}
