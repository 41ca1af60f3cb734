//! The rule content fingerprint.
//!
//! Identifies semantically identical rules regardless of metadata, comment,
//! or whitespace differences: only string definitions and condition terms
//! feed the hash. Wildcard and group references expand to *sorted* value
//! lists, so reordering strings within such a group does not change the
//! fingerprint, while any change to string content, modifiers, or condition
//! structure does.

use crate::types::{Rule, StringKind};
use regex::Regex;
use sha3::{Digest, Sha3_256};
use std::collections::HashMap;
use std::sync::LazyLock;

static NON_HEX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-fA-F?0-9]+").unwrap());

/// Sigils that mark a condition term as a string reference.
const REFERENCE_SIGILS: [char; 4] = ['$', '!', '#', '@'];

/// Compute the hex-encoded SHA3-256 fingerprint of a rule's content.
pub fn fingerprint(rule: &Rule) -> String {
    let mut parts: Vec<String> = Vec::new();
    // String name (with sigil) → canonical representation.
    let mut substitutions: HashMap<String, String> = HashMap::new();
    let mut text_values: Vec<String> = Vec::new();

    for string in &rule.strings {
        if string.kind == StringKind::Byte {
            // Byte patterns reduce to their hex digits and wildcards, and
            // contribute at definition position.
            let canonical = NON_HEX_RE.replace_all(&string.value, "").into_owned();
            substitutions.insert(string.name.clone(), canonical.clone());
            parts.push(canonical);
        } else {
            // Text and regex strings canonicalize to value plus modifiers;
            // they contribute only where the condition references them.
            let mut canonical = string.value.clone();
            if let Some(modifiers) = &string.modifiers {
                for modifier in modifiers {
                    canonical.push(' ');
                    canonical.push_str(modifier);
                }
            }
            text_values.push(format!("${}", canonical));
            substitutions.insert(string.name.clone(), canonical);
        }
    }
    let expansion = sorted_comma_list(text_values);

    for term in &rule.condition_terms {
        if term.starts_with("$*") || term.starts_with("them") {
            parts.push(expansion.clone());
        } else if term.len() > 1 && term.starts_with(REFERENCE_SIGILS) {
            let (sigil, name) = term.split_at(1);
            let lookup = format!("${}", name);
            if let Some(stem) = lookup.strip_suffix('*') {
                parts.push(sorted_comma_list(matching_values(
                    sigil,
                    stem,
                    &substitutions,
                )));
            } else if let Some(value) = substitutions.get(&lookup) {
                parts.push(format!("{}{}", sigil, value));
            } else {
                parts.push(term.clone());
            }
        } else {
            parts.push(term.clone());
        }
    }

    hex::encode(Sha3_256::digest(parts.concat().as_bytes()))
}

/// Expand a group reference (`$stem*`) to every substitution whose name
/// matches the stem.
fn matching_values(
    sigil: &str,
    stem: &str,
    substitutions: &HashMap<String, String>,
) -> Vec<String> {
    let pattern = format!("^\\{}.*$", stem);
    let Ok(name_regex) = Regex::new(&pattern) else {
        return Vec::new();
    };
    substitutions
        .iter()
        .filter(|(name, _)| name_regex.is_match(name))
        .map(|(_, value)| format!("{}{}", sigil, value))
        .collect()
}

/// Sort values and join them with commas, mimicking a hand-written
/// comma-delimited string list.
fn sorted_comma_list(mut values: Vec<String>) -> String {
    values.sort_unstable();
    values.join(",")
}
