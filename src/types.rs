use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

// ─── Metadata tags ──────────────────────────────────────────────────────────

/// The value of one metadata tag.
///
/// YARA metadata values are strings, integers, or booleans; the interchange
/// form carries them untagged, so a bare `true` or `42` stays typed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetaValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl MetaValue {
    /// True for the empty string; integers and booleans are never empty.
    pub fn is_empty_text(&self) -> bool {
        matches!(self, MetaValue::Str(s) if s.is_empty())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            MetaValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for MetaValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetaValue::Bool(b) => write!(f, "{}", b),
            MetaValue::Int(n) => write!(f, "{}", n),
            MetaValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Str(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Str(value)
    }
}

/// One metadata entry: a key/value mapping preserving source order.
///
/// A well-formed tag has exactly one entry; tags with several keys can occur
/// in parsed input and are carried through untouched but never validated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaTag(pub IndexMap<String, MetaValue>);

impl MetaTag {
    /// Build a single-entry tag.
    pub fn pair(key: impl Into<String>, value: impl Into<MetaValue>) -> Self {
        let mut map = IndexMap::with_capacity(1);
        map.insert(key.into(), value.into());
        MetaTag(map)
    }

    /// The key/value pair of a well-formed tag, or None for multi-key tags.
    pub fn single(&self) -> Option<(&str, &MetaValue)> {
        if self.0.len() == 1 {
            self.0.iter().next().map(|(k, v)| (k.as_str(), v))
        } else {
            None
        }
    }

    /// First key of the tag, regardless of arity.
    pub fn key(&self) -> Option<&str> {
        self.0.keys().next().map(String::as_str)
    }

    /// First value of the tag, regardless of arity.
    pub fn value(&self) -> Option<&MetaValue> {
        self.0.values().next()
    }
}

// ─── String definitions ─────────────────────────────────────────────────────

/// How a string definition's value is written.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StringKind {
    Text,
    Byte,
    Regex,
}

/// One string definition: `$name = value modifiers...`.
///
/// `name` carries its leading sigil and `value` is kept exactly as parsed:
/// byte patterns include their braces, regexes their slashes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StringDef {
    pub name: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: StringKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modifiers: Option<Vec<String>>,
}

// ─── Rule ───────────────────────────────────────────────────────────────────

/// A structured rule, as produced by an external YARA parser.
///
/// The metadata sequence is `None` when the rule has no `meta:` section at
/// all, which is distinct from an empty one. Validators mutate the rule in
/// place: values are normalized, generated fields are inserted, and tags that
/// are empty or unresolvable are removed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rule {
    pub rule_name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Vec<MetaTag>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strings: Vec<StringDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub condition_terms: Vec<String>,
}

impl Rule {
    /// The metadata sequence, empty when the section is absent.
    pub fn meta(&self) -> &[MetaTag] {
        self.metadata.as_deref().unwrap_or(&[])
    }

    pub(crate) fn meta_mut(&mut self) -> &mut Vec<MetaTag> {
        self.metadata.get_or_insert_with(Vec::new)
    }
}
