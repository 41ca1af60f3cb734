//! Rule interchange loading.
//!
//! The crate does not parse YARA syntax; it consumes the structured JSON
//! shape external parsers emit (one object per rule, or an array of them).
//! These functions perform serde deserialization and shape checks only.

use crate::error::RuleParseError;
use crate::types::Rule;
use serde_json::Value;

/// Parse a single rule from its JSON interchange form. An array input
/// yields its first rule.
pub fn parse_rule(input: &str) -> Result<Rule, RuleParseError> {
    if input.trim().is_empty() {
        return Err(RuleParseError::Empty);
    }
    let value: Value = serde_json::from_str(input)?;
    let object = match value {
        Value::Array(mut rules) => {
            if rules.is_empty() {
                return Err(RuleParseError::NoRules);
            }
            rules.remove(0)
        }
        other => other,
    };
    Ok(serde_json::from_value(object)?)
}

/// Parse every rule from a JSON interchange document.
pub fn parse_rules(input: &str) -> Result<Vec<Rule>, RuleParseError> {
    if input.trim().is_empty() {
        return Err(RuleParseError::Empty);
    }
    let value: Value = serde_json::from_str(input)?;
    match value {
        Value::Array(rules) => rules
            .into_iter()
            .map(|r| serde_json::from_value(r).map_err(RuleParseError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}
