//! Rule text rendering and metadata splicing.
//!
//! [`render_rule`] serializes a structured rule back into rule-text form.
//! [`splice_metadata`] then reconciles that rendering with the original
//! source: only the metadata span is replaced, so comments and formatting
//! outside the `meta:` section survive byte-for-byte.

use crate::types::{MetaValue, Rule, StringKind};
use regex::Regex;
use std::sync::LazyLock;

static META_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*meta\s*:\s*$").unwrap());

static NEXT_SECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:strings|condition)\s*:\s*$").unwrap());

/// Serialize a rule into text form.
pub fn render_rule(rule: &Rule) -> String {
    let mut out = String::new();

    for scope in &rule.scopes {
        out.push_str(scope);
        out.push(' ');
    }
    out.push_str("rule ");
    out.push_str(&rule.rule_name);
    if !rule.tags.is_empty() {
        out.push_str(" : ");
        out.push_str(&rule.tags.join(" "));
    }
    out.push_str("\n{\n");

    if let Some(metadata) = &rule.metadata {
        out.push_str("    meta:\n");
        for tag in metadata {
            for (key, value) in tag.0.iter() {
                out.push_str("        ");
                out.push_str(key);
                out.push_str(" = ");
                out.push_str(&render_value(value));
                out.push('\n');
            }
        }
    }

    if !rule.strings.is_empty() {
        out.push_str("    strings:\n");
        for string in &rule.strings {
            out.push_str("        ");
            out.push_str(&string.name);
            out.push_str(" = ");
            match string.kind {
                // Byte patterns carry their braces, regexes their slashes.
                StringKind::Byte | StringKind::Regex => out.push_str(&string.value),
                StringKind::Text => {
                    out.push('"');
                    out.push_str(&string.value);
                    out.push('"');
                }
            }
            if let Some(modifiers) = &string.modifiers {
                for modifier in modifiers {
                    out.push(' ');
                    out.push_str(modifier);
                }
            }
            out.push('\n');
        }
    }

    out.push_str("    condition:\n        ");
    out.push_str(&rule.condition_terms.join(" "));
    out.push_str("\n}");
    out
}

fn render_value(value: &MetaValue) -> String {
    match value {
        MetaValue::Str(s) => format!("\"{}\"", s),
        MetaValue::Int(n) => n.to_string(),
        MetaValue::Bool(b) => b.to_string(),
    }
}

/// Replace the original text's metadata span with the canonical rendering's,
/// leaving everything before and after untouched. Falls back to the full
/// canonical rendering when either text lacks locatable section boundaries.
pub(crate) fn splice_metadata(original: &str, canonical: &str) -> String {
    let canonical = canonical.strip_suffix('\n').unwrap_or(canonical);
    if original == canonical {
        return canonical.to_string();
    }

    let original_lines: Vec<&str> = original.lines().collect();
    let canonical_lines: Vec<&str> = canonical.lines().collect();

    if let (Some((orig_start, orig_end)), Some((canon_start, canon_end))) =
        (meta_span(&original_lines), meta_span(&canonical_lines))
    {
        let mut lines: Vec<&str> = Vec::new();
        lines.extend(&original_lines[..orig_start]);
        lines.extend(&canonical_lines[canon_start..canon_end]);
        lines.extend(&original_lines[orig_end..]);
        return lines.join("\n");
    }

    canonical.to_string()
}

/// Locate the metadata span: the `meta:` line up to (excluding) the next
/// section keyword line. The `meta:` line cannot be the first line of a
/// rule, so line 0 never starts a span.
fn meta_span(lines: &[&str]) -> Option<(usize, usize)> {
    let mut start = 0usize;
    for (index, line) in lines.iter().enumerate() {
        if start > 0 {
            if NEXT_SECTION_RE.is_match(line) {
                return Some((start, index));
            }
        } else if META_SECTION_RE.is_match(line) {
            start = index;
        }
    }
    None
}
