use indexmap::IndexMap;
use serde::Serialize;
use std::io;
use thiserror::Error;

// ─── Configuration errors ───────────────────────────────────────────────────

/// Fatal schema-configuration error, raised at registry-compile time.
///
/// These signal an operator mistake, not a rule defect: compilation aborts
/// before any rule is processed and the error is never attributed to a rule.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema configuration is not valid YAML: {0}")]
    Syntax(String),

    #[error("field `{field}` has a missing parameter - {param}")]
    MissingParameter { field: String, param: &'static str },

    #[error("field `{field}` has an invalid parameter - {param}: {reason}")]
    InvalidParameter {
        field: String,
        param: &'static str,
        reason: String,
    },

    #[error("validator `{validator}` of field `{field}` is not defined")]
    UnknownValidator { field: String, validator: String },

    #[error("field `{field}` references `{referenced}`, which is not declared in the schema")]
    DanglingReference { field: String, referenced: String },

    #[error("field `{field}` has an invalid regular expression")]
    Pattern {
        field: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("cannot read schema file `{name}`")]
    ConfigFile {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("cannot read values file `{name}`")]
    ValuesFile {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("values file `{name}` has no `{key}` entry")]
    MissingValues { name: String, key: String },
}

// ─── Knowledge-base errors ──────────────────────────────────────────────────

/// Failure surfaced by a knowledge-base implementation.
///
/// Lookup *misses* are not errors (they are `Ok(None)`/`Ok(false)`); these
/// variants cover transport and content problems. Validators treat them as a
/// per-field failure, never as a fatal condition for the run.
#[derive(Debug, Error)]
pub enum KbError {
    #[error("knowledge base I/O failure")]
    Io(#[from] io::Error),

    #[error("knowledge base content is malformed: {0}")]
    Malformed(String),

    #[error("knowledge base query timed out")]
    Timeout,
}

// ─── Interchange parse errors ───────────────────────────────────────────────

/// Produced when loading a rule from its JSON interchange form fails.
#[derive(Debug, Error)]
pub enum RuleParseError {
    #[error("empty input")]
    Empty,

    #[error("input contains no rules")]
    NoRules,

    #[error("malformed rule JSON: {0}")]
    Json(#[from] serde_json::Error),
}

// ─── Validation report ──────────────────────────────────────────────────────

/// The outcome of validating one rule.
///
/// The validity flag is sticky-false and the warning flag sticky-true: once a
/// diagnostic lands the rule stays invalid, once a warning lands the report
/// stays warned. Diagnostics and warnings keep insertion order.
#[derive(Clone, Debug, Serialize)]
pub struct ValidationReport {
    valid: bool,
    diagnostics: IndexMap<String, String>,
    warned: bool,
    warnings: IndexMap<String, String>,
    original: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    canonical: Option<String>,
}

impl ValidationReport {
    pub(crate) fn new(original: &str) -> Self {
        ValidationReport {
            valid: true,
            diagnostics: IndexMap::new(),
            warned: false,
            warnings: IndexMap::new(),
            original: original.to_string(),
            canonical: None,
        }
    }

    /// Record a per-field verdict. A `false` verdict is sticky.
    pub fn update_validity(&mut self, validity: bool, field: &str, message: impl Into<String>) {
        if self.valid {
            self.valid = validity;
        }
        self.diagnostics.insert(field.to_string(), message.into());
    }

    /// Record an advisory warning for a tag.
    pub fn update_warning(&mut self, tag: &str, message: impl Into<String>) {
        self.warned = true;
        self.warnings.insert(tag.to_string(), message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn has_warnings(&self) -> bool {
        self.warned
    }

    /// Field → message diagnostics, in the order they were recorded.
    pub fn diagnostics(&self) -> &IndexMap<String, String> {
        &self.diagnostics
    }

    /// Tag → message warnings, in the order they were recorded.
    pub fn warnings(&self) -> &IndexMap<String, String> {
        &self.warnings
    }

    /// The rule text exactly as submitted.
    pub fn original_rule(&self) -> &str {
        &self.original
    }

    /// The canonicalized rule text; present only for valid rules.
    pub fn canonical_rule(&self) -> Option<&str> {
        self.canonical.as_deref()
    }

    pub(crate) fn set_canonical(&mut self, text: String) {
        self.canonical = Some(text);
    }

    /// Diagnostics as `field: message` lines; empty for valid rules.
    pub fn errors(&self) -> String {
        if self.valid {
            String::new()
        } else {
            render_plain(&self.diagnostics)
        }
    }

    /// Diagnostics as an indented list, for embedding in larger reports.
    pub fn errors_indented(&self) -> String {
        if self.valid {
            String::new()
        } else {
            render_indented(&self.diagnostics)
        }
    }

    /// Warnings as `tag: message` lines; empty when nothing was warned.
    pub fn warnings_text(&self) -> String {
        if self.warned {
            render_plain(&self.warnings)
        } else {
            String::new()
        }
    }

    /// Warnings as an indented list, for embedding in larger reports.
    pub fn warnings_indented(&self) -> String {
        if self.warned {
            render_indented(&self.warnings)
        } else {
            String::new()
        }
    }
}

fn render_plain(entries: &IndexMap<String, String>) -> String {
    entries
        .iter()
        .map(|(key, message)| format!("{}: {}", key, message))
        .collect::<Vec<_>>()
        .join("\n")
}

fn render_indented(entries: &IndexMap<String, String>) -> String {
    entries
        .iter()
        .map(|(key, message)| format!("{:>9}{:<30} {}", "- ", format!("{}:", key), message))
        .collect::<Vec<_>>()
        .join("\n")
}
