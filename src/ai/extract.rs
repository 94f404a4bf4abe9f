//! Model Response Extraction
//!
//! Model replies wrap their JSON payload in prose, markdown fences, or
//! nothing at all. Extraction locates the payload by precedence:
//!
//! 1. Fenced code block (with or without a language tag)
//! 2. First balanced `{..}` span
//! 3. First balanced `[..]` span
//! 4. The trimmed reply itself, when it starts with a JSON delimiter
//!
//! The located block is then decoded strictly. Content that is not valid
//! JSON surfaces as a `DecodeFailure`; content that decodes but misses
//! required fields surfaces as `MalformedPayload`. Nothing is rewritten
//! or repaired on the way through.

use serde_json::Value;

use crate::constants::extract as extract_constants;
use crate::types::{Failure, FailureKind, Result};

const SOURCE: &str = "extract";

// =============================================================================
// Block Location
// =============================================================================

/// Locate the JSON payload inside a raw model reply.
///
/// Returns the payload as a slice of the input; decoding is the caller's
/// concern. Fails with a `DecodeFailure` quoting a preview of the reply
/// when no candidate is found.
pub fn extract_block(raw: &str) -> Result<&str> {
    if let Some(block) = fenced_block(raw) {
        return Ok(block);
    }
    if let Some(span) = delimited_span(raw, '{', '}') {
        return Ok(span);
    }
    if let Some(span) = delimited_span(raw, '[', ']') {
        return Ok(span);
    }
    let trimmed = raw.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return Ok(trimmed);
    }
    Err(Failure::with_source(
        FailureKind::DecodeFailure,
        format!(
            "no JSON payload found in model output. Content preview: {}...",
            preview(raw)
        ),
        SOURCE,
    )
    .into())
}

/// Content of the first markdown code fence, language tag stripped
fn fenced_block(raw: &str) -> Option<&str> {
    let open = raw.find("```")?;
    let rest = &raw[open + 3..];
    let close = rest.find("```")?;
    let mut block = &rest[..close];

    // Drop a language tag line like "json"
    if let Some(newline) = block.find('\n') {
        let first_line = block[..newline].trim();
        if !first_line.is_empty() && first_line.chars().all(|c| c.is_ascii_alphanumeric()) {
            block = &block[newline + 1..];
        }
    }

    let block = block.trim();
    (!block.is_empty()).then_some(block)
}

/// First `open`-to-matching-`close` span, tracking strings and escapes
fn delimited_span(raw: &str, open: char, close: char) -> Option<&str> {
    let start = raw.find(open)?;
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape = false;

    for (i, ch) in raw[start..].char_indices() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + i + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(raw: &str) -> String {
    raw.chars()
        .take(extract_constants::PREVIEW_CHARS)
        .collect()
}

// =============================================================================
// Decoding and Validation
// =============================================================================

/// Locate and decode the payload, requiring a keyed object at the top.
pub fn extract(raw: &str) -> Result<serde_json::Map<String, Value>> {
    let block = extract_block(raw)?;
    let value: Value = serde_json::from_str(block).map_err(|e| {
        Failure::with_source(
            FailureKind::DecodeFailure,
            format!(
                "payload is not valid JSON: {e}. Content preview: {}...",
                preview(block)
            ),
            SOURCE,
        )
    })?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(Failure::with_source(
            FailureKind::DecodeFailure,
            format!("expected a keyed object, got {}", value_kind(&other)),
            SOURCE,
        )
        .into()),
    }
}

/// Check that every required field is present.
///
/// Presence is what counts; an explicit null passes. A payload failing
/// here decoded fine, so the failure kind is `MalformedPayload`, not
/// `DecodeFailure`.
pub fn validate_required_fields(
    payload: &serde_json::Map<String, Value>,
    required: &[&str],
) -> Result<()> {
    let missing: Vec<&str> = required
        .iter()
        .filter(|field| !payload.contains_key(**field))
        .copied()
        .collect();
    if missing.is_empty() {
        return Ok(());
    }
    Err(Failure::with_source(
        FailureKind::MalformedPayload,
        format!("missing required fields: {}", missing.join(", ")),
        SOURCE,
    )
    .into())
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// Tests
// =============================================================================
