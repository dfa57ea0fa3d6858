//! Structured-output recovery for model responses
//!
//! Specialist models are asked for a JSON object with `explanation`,
//! `citation`, and `answer` fields, but real responses wrap the object in
//! prose, code fences, comments, and half-escaped quotes. This module turns
//! any response text into an [`OutputRecord`] without ever failing: when
//! nothing recoverable is found, the record explains the failure and keeps
//! the raw text as the answer.

use crate::models::{AnswerValue, OutputRecord};
use std::fmt;
use tracing::{debug, warn};

/// Why recovery of a response failed. The caller-facing result is the same
/// fallback record in every case; the kind is kept for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryFailure {
    /// No candidate payload was found in the response text.
    Extraction,
    /// The candidate was still not valid JSON after repair.
    Decode(String),
    /// The candidate decoded, but not into the required record shape.
    Schema(String),
}

impl RecoveryFailure {
    fn fallback_message(&self) -> String {
        match self {
            RecoveryFailure::Extraction => {
                "Failed to extract JSON from the model response".to_string()
            }
            RecoveryFailure::Decode(detail) => {
                format!("Failed to parse JSON from the model response: {}", detail)
            }
            RecoveryFailure::Schema(detail) => {
                format!("Model response JSON did not match the expected structure: {}", detail)
            }
        }
    }
}

impl fmt::Display for RecoveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecoveryFailure::Extraction => write!(f, "no structured payload found"),
            RecoveryFailure::Decode(detail) => write!(f, "invalid JSON after repair: {}", detail),
            RecoveryFailure::Schema(detail) => write!(f, "schema violation: {}", detail),
        }
    }
}

/// Recovers a structured record from raw model output. Total: malformed
/// input degrades to a fallback record instead of an error.
pub fn recover(raw: &str) -> OutputRecord {
    match try_recover(raw) {
        Ok(record) => record,
        Err(failure) => {
            warn!(%failure, "structured recovery failed, falling back to raw text");
            OutputRecord::fallback(failure.fallback_message(), raw)
        }
    }
}

/// Same pipeline as [`recover`], surfacing the failure kind.
pub fn try_recover(raw: &str) -> Result<OutputRecord, RecoveryFailure> {
    let candidate = extract_candidate(raw).ok_or(RecoveryFailure::Extraction)?;
    let repaired = repair(candidate);
    let record = parse_record(&repaired)?;
    debug!(
        answer_present = record.answer.is_some(),
        citation_present = record.citation.is_some(),
        "recovered structured output"
    );
    Ok(record)
}

/// Extraction and repair without the record schema, for callers decoding
/// payload shapes other than [`OutputRecord`] (the run evaluator's verdict,
/// for one). Returns `None` when no candidate payload exists.
pub fn extract_payload(raw: &str) -> Option<String> {
    extract_candidate(raw).map(repair)
}

/// Pulls the most plausible JSON payload out of the response text.
///
/// Strategies in order, first success wins: the last complete fenced code
/// block, then the span from the first `{` to the last `}`, then the last
/// minimal `{...}` pair. Models that "correct themselves" emit the fixed
/// payload last, which is why later candidates are preferred.
fn extract_candidate(text: &str) -> Option<&str> {
    if let Some(block) = last_fenced_block(text) {
        return Some(block);
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            return Some(&text[start..=end]);
        }
    }
    last_minimal_pair(text)
}

/// Content of the last complete ``` fence, with an optional `json` language
/// tag dropped.
fn last_fenced_block(text: &str) -> Option<&str> {
    let mut last = None;
    let mut cursor = 0;
    while let Some(open) = text[cursor..].find("```") {
        let body_start = cursor + open + 3;
        let Some(close) = text[body_start..].find("```") else {
            break;
        };
        let block = text[body_start..body_start + close].trim();
        let block = block.strip_prefix("json").unwrap_or(block).trim_start();
        last = Some(block);
        cursor = body_start + close + 3;
    }
    last
}

/// Last brace pair containing no nested braces.
fn last_minimal_pair(text: &str) -> Option<&str> {
    let mut result = None;
    let mut open = None;
    for (index, c) in text.char_indices() {
        match c {
            '{' => open = Some(index),
            '}' => {
                if let Some(start) = open.take() {
                    result = Some(&text[start..=index]);
                }
            }
            _ => {}
        }
    }
    result
}

/// Repairs the JSON mistakes models make most often: `//` line comments,
/// dangling commas before a closing bracket, and unescaped quotes inside
/// string literals. One left-to-right pass tracking string state, so quoted
/// text (URLs in citations especially) is never touched. Running it again
/// on its own output changes nothing.
pub fn repair(candidate: &str) -> String {
    let chars: Vec<char> = candidate.chars().collect();
    let mut out = String::with_capacity(candidate.len());
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            match c {
                '\\' => {
                    out.push(c);
                    if i + 1 < chars.len() {
                        out.push(chars[i + 1]);
                        i += 2;
                    } else {
                        i += 1;
                    }
                }
                '"' => {
                    if closes_literal(&chars, i + 1) {
                        in_string = false;
                        out.push('"');
                    } else {
                        out.push('\\');
                        out.push('"');
                    }
                    i += 1;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        } else {
            match c {
                '"' => {
                    in_string = true;
                    out.push(c);
                    i += 1;
                }
                '/' if chars.get(i + 1) == Some(&'/') => {
                    while i < chars.len() && chars[i] != '\n' {
                        i += 1;
                    }
                }
                ',' if comma_is_dangling(&chars, i + 1) => {
                    i += 1;
                }
                _ => {
                    out.push(c);
                    i += 1;
                }
            }
        }
    }
    out
}

/// A quote ends the current literal when the next significant character is
/// structural JSON (`:`, `,`, `}`, `]`) or the input ends. Anything else
/// means the quote sits inside the text and needs escaping.
fn closes_literal(chars: &[char], mut i: usize) -> bool {
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        return matches!(c, ':' | ',' | '}' | ']');
    }
    true
}

/// A comma is dangling when only whitespace, comments, or further commas
/// separate it from a closing bracket. Skipping subsequent commas here lets
/// a `,,}` run collapse in a single pass.
fn comma_is_dangling(chars: &[char], mut i: usize) -> bool {
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() || c == ',' {
            i += 1;
            continue;
        }
        if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
            continue;
        }
        return c == '}' || c == ']';
    }
    false
}

/// Decodes a repaired candidate and checks the record shape: a JSON object
/// carrying at least the `explanation` and `answer` keys.
fn parse_record(candidate: &str) -> Result<OutputRecord, RecoveryFailure> {
    let value: serde_json::Value = serde_json::from_str(candidate)
        .map_err(|error| RecoveryFailure::Decode(error.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(RecoveryFailure::Schema("top-level value is not an object".to_string()));
    };

    let explanation = match object.get("explanation") {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(serde_json::Value::Null) => {
            return Err(RecoveryFailure::Schema("`explanation` is null".to_string()));
        }
        Some(other) => other.to_string(),
        None => {
            return Err(RecoveryFailure::Schema("missing required key `explanation`".to_string()));
        }
    };
    if !object.contains_key("answer") {
        return Err(RecoveryFailure::Schema("missing required key `answer`".to_string()));
    }

    let citation = match object.get("citation") {
        Some(serde_json::Value::String(text)) => Some(text.clone()),
        Some(serde_json::Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    };
    let answer = object
        .get("answer")
        .cloned()
        .and_then(AnswerValue::from_json);

    Ok(OutputRecord { explanation, citation, answer })
}
