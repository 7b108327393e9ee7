//! Regular expression helpers for pulling a value out of a response body.

use crate::error::{Result, SensorError};
use regex::Regex;
use serde_json::Value;

/// Pattern used when none is configured: the first run of up to three digits.
pub const DEFAULT_STATUS_PATTERN: &str = "([0-9]{1,3})";

/// Capture group extracted when none is configured.
pub const DEFAULT_GROUP: usize = 1;

pub fn default_pattern() -> Regex {
    Regex::new(DEFAULT_STATUS_PATTERN).expect("default status pattern is valid")
}

/// Parse a pattern property from configuration.
///
/// Only strings are accepted; they are compiled as regular expressions.
pub fn parse_pattern(property: &Value) -> Result<Regex> {
    match property {
        Value::String(pattern) => Regex::new(pattern)
            .map_err(|e| SensorError::UnsupportedPattern(e.to_string())),
        other => Err(SensorError::UnsupportedPattern(type_name(other).to_string())),
    }
}

/// Apply `pattern` to `input` and return the text of capture group `group`.
pub fn extract_value_from_pattern(pattern: &Regex, input: &str, group: usize) -> Result<String> {
    let Some(captures) = pattern.captures(input) else {
        return Err(SensorError::PatternMismatch {
            value: input.to_string(),
            pattern: pattern.as_str().to_string(),
        });
    };

    if group >= captures.len() {
        return Err(SensorError::GroupOutOfBounds(group));
    }

    // Optional groups may not have participated in the match
    captures
        .get(group)
        .map(|m| m.as_str().to_string())
        .ok_or(SensorError::GroupOutOfBounds(group))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
