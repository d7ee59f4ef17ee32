//! Response normalizer.
//!
//! The completion endpoint is asked for a JSON object but is not bound to
//! return one. Each stage below is a fallback for the previous:
//! 1. the trimmed text parsed directly as a JSON object
//! 2. the first fenced block labelled `json` (or unlabelled), parsed
//! 3. the span from the first `{` to the last `}`, parsed, unless that span
//!    sits inside a code fence (an object literal in the fix is not a result)
//! 4. no structure at all: the first js/ts (or unlabelled) fenced block, or
//!    the whole text, becomes the fixed code

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

use crate::model::{AnalysisFields, Severity};

static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"```[ \t]*([A-Za-z0-9_.+-]*)[^\n]*\n([\s\S]*?)```")
        .unwrap_or_else(|_| panic!("Invalid Regex"))
});

const JSON_LABELS: &[&str] = &["", "json"];
const CODE_LABELS: &[&str] = &["", "javascript", "js", "typescript", "ts"];

/// Turns raw model output into canonical fields. Never fails.
pub fn normalize(raw: &str) -> AnalysisFields {
    let text = raw.trim();
    match extract_json_object(text) {
        Some(object) => fields_from_object(&object),
        None => AnalysisFields {
            fixed_code: first_fenced_block(text, CODE_LABELS)
                .map(|code| code.trim().to_string())
                .unwrap_or_else(|| text.to_string()),
            ..AnalysisFields::default()
        },
    }
}

/// Structured stages (1-3) of [`normalize`]: the first JSON object the text yields.
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    let text = text.trim();

    if let Some(object) = parse_object(text) {
        return Some(object);
    }

    if let Some(block) = first_fenced_block(text, JSON_LABELS) {
        if let Some(object) = parse_object(block.trim()) {
            return Some(object);
        }
    }

    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start || inside_code_fence(text, start, end) {
        return None;
    }
    parse_object(&text[start..=end])
}

/// Whether `start..=end` lies in the body of a fence not labelled `json`.
fn inside_code_fence(text: &str, start: usize, end: usize) -> bool {
    FENCED_BLOCK_RE.captures_iter(text).any(|caps| {
        let label = caps.get(1).map_or("", |m| m.as_str());
        caps.get(2).is_some_and(|body| {
            !label.eq_ignore_ascii_case("json") && body.start() <= start && end < body.end()
        })
    })
}

fn parse_object(text: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Content of the first fenced block whose label is one of `labels`
/// (compared case-insensitively; `""` accepts an unlabelled fence).
fn first_fenced_block<'a>(text: &'a str, labels: &[&str]) -> Option<&'a str> {
    FENCED_BLOCK_RE.captures_iter(text).find_map(|caps| {
        let label = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
        if labels.contains(&label.as_str()) {
            caps.get(2).map(|m| m.as_str())
        } else {
            None
        }
    })
}

fn fields_from_object(object: &Map<String, Value>) -> AnalysisFields {
    let defaults = AnalysisFields::default();

    let findings = match object.get("findings") {
        Some(Value::Array(items)) => items.iter().map(value_text).collect(),
        _ => defaults.findings,
    };

    let vulnerability_type = object
        .get("vulnerability_type")
        .map(value_text)
        .filter(|s| !s.is_empty())
        .unwrap_or(defaults.vulnerability_type);

    let severity = match object.get("severity") {
        Some(Value::String(s)) => Severity::parse_lenient(s),
        _ => defaults.severity,
    };

    AnalysisFields {
        summary: object.get("summary").map(value_text).unwrap_or_default(),
        findings,
        fixed_code: object.get("fixed_code").map(value_text).unwrap_or_default(),
        vulnerability_type,
        severity,
    }
}

/// Strings verbatim, `null` as empty, anything else as compact JSON.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
