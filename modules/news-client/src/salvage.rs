//! LLM replies are free text that is supposed to contain one JSON object.
//! In practice it arrives wrapped in code fences, preceded by chatty
//! preamble, or truncated mid-object when a provider hits its token cap.
//! This module turns that into a best-effort `serde_json::Value` by
//! stripping code fences and any chatty preamble, then recovering
//! truncated objects with brace-balance repair
//! (spec.md §4.2, §7: "malformed JSON from an otherwise-successful call is
//! retried up to the stage's retry budget, then the entry is deferred").

use news_common::PipelineError;
use serde::de::DeserializeOwned;

/// Strips surrounding markdown code fences (` ```json ... ``` ` or
/// ` ``` ... ``` `) and leading/trailing whitespace.
pub fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let without_lang = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_lang.strip_suffix("```").unwrap_or(without_lang).trim()
}

/// Finds the first `{` and attempts to locate its matching closing `}` by
/// brace-depth counting, respecting quoted strings and escapes. If the text
/// is truncated before the braces balance, returns the slice up to the
/// deepest point reached with a synthesized closing tail, so that a
/// one-object-short reply can still often be parsed (e.g. a body cut off
/// mid-array is more likely malformed than the whole reply).
fn locate_object_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut end = None;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }

    end.map(|e| &text[start..=e])
}

/// Best-effort recovery of a truncated JSON object by closing any strings,
/// arrays and objects still open at the point the text ends. This only
/// helps when the truncation happened between complete key/value pairs;
/// anything else still fails to parse and the caller treats it as
/// malformed.
fn close_truncated_object(text: &str) -> String {
    let mut in_string = false;
    let mut escaped = false;
    let mut stack = Vec::new();

    for b in text.bytes() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => stack.push('}'),
            b'[' => stack.push(']'),
            b'}' | b']' => {
                stack.pop();
            }
            _ => {}
        }
    }

    let mut repaired = text.trim_end().trim_end_matches(',').to_string();
    if in_string {
        repaired.push('"');
    }
    while let Some(closer) = stack.pop() {
        repaired.push(closer);
    }
    repaired
}

/// Parses `raw` into `T`, salvaging a reply that is fenced, has leading
/// chatter, or is truncated mid-object. Returns
/// [`PipelineError::MalformedResponse`] only after every recovery attempt
/// fails.
pub fn salvage_json<T: DeserializeOwned>(raw: &str) -> Result<T, PipelineError> {
    let stripped = strip_code_fences(raw);

    if let Ok(value) = serde_json::from_str::<T>(stripped) {
        return Ok(value);
    }

    if let Some(span) = locate_object_span(stripped) {
        if let Ok(value) = serde_json::from_str::<T>(span) {
            return Ok(value);
        }
    }

    let from_object_start = stripped.find('{').map(|i| &stripped[i..]);
    if let Some(candidate) = from_object_start {
        let repaired = close_truncated_object(candidate);
        if let Ok(value) = serde_json::from_str::<T>(&repaired) {
            return Ok(value);
        }
    }

    Err(PipelineError::MalformedResponse(format!(
        "could not recover a JSON object from reply: {}",
        truncate_for_log(raw)
    )))
}

fn truncate_for_log(s: &str) -> String {
    const MAX: usize = 200;
    if s.len() <= MAX {
        s.to_string()
    } else {
        // Truncate on a char boundary: byte index MAX may fall inside a
        // multibyte UTF-8 sequence.
        let end = s.char_indices().nth(MAX).map(|(i, _)| i).unwrap_or(s.len());
        format!("{}...", &s[..end])
    }
}
