//! The field registry compiler.
//!
//! Turns a declarative YAML schema — an ordered mapping from field name to
//! declaration — into an immutable in-memory registry: one [`FieldDef`] per
//! field, in canonical (declaration) order, with every validator argument
//! resolved to a typed [`ValidatorKind`]. Any defect in the configuration is
//! a fatal [`SchemaError`] raised here, before any rule is processed.

use crate::error::SchemaError;
use indexmap::IndexMap;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Suffix appended to a child field's registry key while it is dormant.
const PLACEHOLDER_SUFFIX: &str = "_child";

/// Fallback pattern for category sub-field values.
const CATEGORY_TYPE_PATTERN: &str = r"[A-Z\- 0-9_]*";

const BUILTIN_CONFIG: &str = include_str!("../schema/default.yml");
const BUILTIN_VALUES: &str = include_str!("../schema/values.yml");
const BUILTIN_VALUES_NAME: &str = "values.yml";

// ─── Declarations ───────────────────────────────────────────────────────────

/// How a field's presence is enforced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Optionality {
    /// Must be present in the input rule.
    Required,
    /// Must be present in the output; generated when absent from the input.
    Generatable,
    /// May be absent.
    Optional,
}

/// A field's validation behavior with its resolved arguments.
#[derive(Clone, Debug)]
pub enum ValidatorKind {
    /// Whole-value regex match with an upper-casing fallback.
    Regex { pattern: Regex },
    /// Random 128-bit base-62 identifier; verified when already present.
    Identifier,
    /// Content fingerprint; always recomputed.
    Fingerprint,
    /// Dotted-numeric version check, defaulting to "1.0".
    Version,
    /// Strict `YYYY-MM-DD` check, filled with the current date when absent.
    FirstImported,
    /// Always overwritten with the current date.
    LastModified,
    /// Universal no-lowercase pattern; the open-source sentinel makes
    /// `requires` a hard requirement.
    Source { requires: String },
    /// Enumerated category; a valid value activates a child field named
    /// after the lower-cased category value.
    Category {
        child_placeholder: String,
        values: Vec<String>,
    },
    /// The category's child field, dispatched only after promotion.
    CategoryType { pattern: Regex },
    /// Knowledge-base ID lookup with prefix dispatch.
    AttackId,
    /// Threat-actor alias; makes `requires` required and activates the
    /// knowledge-base group child.
    Actor {
        requires: String,
        child: String,
        child_placeholder: String,
    },
    /// Resolves the captured actor alias to a canonical group name.
    GroupResolver { parent: String },
    /// Paired-presence field: makes `requires` required, never checks values.
    ConfigDumper { requires: String },
    /// Paired-presence field: makes `requires` required, never checks values.
    ConfigParser { requires: String },
}

/// One compiled schema entry.
#[derive(Clone, Debug)]
pub struct FieldDef {
    /// Declared field name (children keep their declared name even though
    /// they are registered under a placeholder key).
    pub name: String,
    pub optionality: Optionality,
    /// Maximum occurrence count; `None` is unbounded.
    pub max_count: Option<u32>,
    /// Declaration position; also the index of the field's position tracker.
    pub position: usize,
    pub validator: ValidatorKind,
}

// ─── Auxiliary file access ──────────────────────────────────────────────────

/// Source of auxiliary enumerated-value files referenced from declarations.
pub trait FileSource {
    fn read_file(&self, name: &str) -> io::Result<String>;
}

impl FileSource for PathBuf {
    fn read_file(&self, name: &str) -> io::Result<String> {
        fs::read_to_string(self.join(name))
    }
}

impl FileSource for HashMap<String, String> {
    fn read_file(&self, name: &str) -> io::Result<String> {
        self.get(name).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", name))
        })
    }
}

struct BuiltinFiles;

impl FileSource for BuiltinFiles {
    fn read_file(&self, name: &str) -> io::Result<String> {
        if name == BUILTIN_VALUES_NAME {
            Ok(BUILTIN_VALUES.to_string())
        } else {
            Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no such built-in file: {}", name),
            ))
        }
    }
}

// ─── Raw configuration shape ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawDecl {
    optional: Option<Toggle>,
    unique: Option<Toggle>,
    validator: Option<String>,
    #[serde(default)]
    argument: Option<IndexMap<String, String>>,
}

/// A yes/no-ish configuration value: YAML booleans, `y`/`n`/`yes`/`no`
/// spellings, the word `optional`, or (for `unique`) an integer.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Toggle {
    Flag(bool),
    Count(i64),
    Word(String),
}

#[derive(Debug, Deserialize)]
struct ValueEntry {
    value: String,
}

// ─── Schema ─────────────────────────────────────────────────────────────────

/// The compiled field registry: immutable for the life of a validator.
#[derive(Clone, Debug)]
pub struct Schema {
    fields: IndexMap<String, FieldDef>,
    category_values: Vec<String>,
}

impl Schema {
    /// Compile a YAML configuration, resolving auxiliary enumerated-value
    /// files through `files`.
    pub fn compile(config_yaml: &str, files: &dyn FileSource) -> Result<Self, SchemaError> {
        let value: serde_json::Value =
            serde_saphyr::from_str(config_yaml).map_err(|e| SchemaError::Syntax(e.to_string()))?;
        let raw: IndexMap<String, RawDecl> =
            serde_json::from_value(value).map_err(|e| SchemaError::Syntax(e.to_string()))?;

        let mut fields: IndexMap<String, FieldDef> = IndexMap::with_capacity(raw.len());
        let mut category_values = Vec::new();
        // (declaring field, referenced field) pairs to cross-check afterwards.
        let mut references: Vec<(String, String)> = Vec::new();
        // Fields referenced as a child, which must themselves declare a parent.
        let mut child_refs: Vec<(String, String)> = Vec::new();

        for (position, (name, decl)) in raw.iter().enumerate() {
            let optionality = parse_optional(name, decl.optional.as_ref())?;
            let max_count = parse_unique(name, decl.unique.as_ref())?;
            let validator_name = decl.validator.as_deref().ok_or_else(|| {
                SchemaError::MissingParameter {
                    field: name.clone(),
                    param: "validator",
                }
            })?;
            let arg = decl.argument.as_ref();

            let validator = match validator_name {
                "valid_regex" => ValidatorKind::Regex {
                    pattern: regex_argument(name, arg, files)?,
                },
                "valid_uuid" => ValidatorKind::Identifier,
                "valid_fingerprint" => ValidatorKind::Fingerprint,
                "valid_version" => ValidatorKind::Version,
                "valid_first_imported" => ValidatorKind::FirstImported,
                "valid_last_modified" => ValidatorKind::LastModified,
                "valid_source" => ValidatorKind::Source {
                    requires: required_argument(name, arg, "required")?,
                },
                "valid_category" => {
                    let child = required_argument(name, arg, "child")?;
                    let values = enumerated_values(name, arg, files)?;
                    category_values = values.clone();
                    ValidatorKind::Category {
                        child_placeholder: placeholder_key(&child),
                        values,
                    }
                }
                "valid_category_type" => {
                    // The parent reference is checked below; only the value
                    // pattern is needed at runtime.
                    required_argument(name, arg, "parent")?;
                    let pattern = match arg.and_then(|a| a.get("regexExpression")) {
                        Some(expr) => anchored(name, expr)?,
                        None => anchored(name, CATEGORY_TYPE_PATTERN)?,
                    };
                    ValidatorKind::CategoryType { pattern }
                }
                "valid_mitre_att" => ValidatorKind::AttackId,
                "valid_actor" => {
                    let child = required_argument(name, arg, "child")?;
                    ValidatorKind::Actor {
                        requires: required_argument(name, arg, "required")?,
                        child_placeholder: placeholder_key(&child),
                        child,
                    }
                }
                "mitre_group_generator" => ValidatorKind::GroupResolver {
                    parent: required_argument(name, arg, "parent")?,
                },
                "valid_al_config_dumper" => ValidatorKind::ConfigDumper {
                    requires: required_argument(name, arg, "required")?,
                },
                "valid_al_config_parser" => ValidatorKind::ConfigParser {
                    requires: required_argument(name, arg, "required")?,
                },
                other => {
                    return Err(SchemaError::UnknownValidator {
                        field: name.clone(),
                        validator: other.to_string(),
                    });
                }
            };

            let mut registry_key = name.clone();
            if let Some(arg) = arg {
                for param in ["parent", "child", "required"] {
                    if let Some(referenced) = arg.get(param) {
                        references.push((name.clone(), referenced.clone()));
                        if param == "child" {
                            child_refs.push((name.clone(), referenced.clone()));
                        }
                    }
                }
                // Child fields are registered under a placeholder key until
                // their parent promotes them to an active tag name.
                if arg.contains_key("parent") {
                    registry_key = placeholder_key(name);
                }
            }

            fields.insert(
                registry_key,
                FieldDef {
                    name: name.clone(),
                    optionality,
                    max_count,
                    position,
                    validator,
                },
            );
        }

        for (field, referenced) in &references {
            if !raw.contains_key(referenced) {
                return Err(SchemaError::DanglingReference {
                    field: field.clone(),
                    referenced: referenced.clone(),
                });
            }
        }
        for (field, child) in &child_refs {
            let declares_parent = raw
                .get(child)
                .and_then(|d| d.argument.as_ref())
                .is_some_and(|a| a.contains_key("parent"));
            if !declares_parent {
                return Err(SchemaError::InvalidParameter {
                    field: field.clone(),
                    param: "child",
                    reason: format!("`{}` does not declare this field as its parent", child),
                });
            }
        }

        debug!(fields = fields.len(), "compiled metadata schema");
        Ok(Schema {
            fields,
            category_values,
        })
    }

    /// Compile a configuration file, resolving auxiliary files relative to
    /// its parent directory.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchemaError> {
        let path = path.as_ref();
        let config = fs::read_to_string(path).map_err(|source| SchemaError::ConfigFile {
            name: path.display().to_string(),
            source,
        })?;
        let dir = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        Self::compile(&config, &dir)
    }

    /// The embedded default configuration.
    pub fn builtin() -> Result<Self, SchemaError> {
        Self::compile(BUILTIN_CONFIG, &BuiltinFiles)
    }

    /// Look up a field by registry key (a tag name, or a placeholder key for
    /// dormant children).
    pub fn get(&self, key: &str) -> Option<&FieldDef> {
        self.fields.get(key)
    }

    /// The field at a declaration position.
    pub fn field_at(&self, position: usize) -> Option<&FieldDef> {
        self.fields.get_index(position).map(|(_, def)| def)
    }

    /// Fields in declaration (canonical) order.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.values()
    }

    /// Registry keys and fields in declaration order.
    pub(crate) fn entries(&self) -> impl Iterator<Item = (&str, &FieldDef)> {
        self.fields.iter().map(|(k, d)| (k.as_str(), d))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `name`, upper-cased, is a configured category value.
    pub fn is_category_value(&self, name: &str) -> bool {
        let upper = name.to_uppercase();
        self.category_values.iter().any(|v| *v == upper)
    }
}

fn placeholder_key(name: &str) -> String {
    format!("{}{}", name, PLACEHOLDER_SUFFIX)
}

// ─── Declaration parameter parsing ──────────────────────────────────────────

fn parse_optional(field: &str, toggle: Option<&Toggle>) -> Result<Optionality, SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidParameter {
        field: field.to_string(),
        param: "optional",
        reason,
    };
    match toggle {
        None => Err(SchemaError::MissingParameter {
            field: field.to_string(),
            param: "optional",
        }),
        Some(Toggle::Flag(true)) => Ok(Optionality::Optional),
        Some(Toggle::Flag(false)) => Ok(Optionality::Required),
        Some(Toggle::Word(word)) => match word.to_lowercase().as_str() {
            "y" | "yes" => Ok(Optionality::Optional),
            "n" | "no" => Ok(Optionality::Required),
            "optional" => Ok(Optionality::Generatable),
            other => Err(invalid(format!("unrecognized value `{}`", other))),
        },
        Some(Toggle::Count(n)) => Err(invalid(format!("unrecognized value `{}`", n))),
    }
}

fn parse_unique(field: &str, toggle: Option<&Toggle>) -> Result<Option<u32>, SchemaError> {
    let invalid = |reason: String| SchemaError::InvalidParameter {
        field: field.to_string(),
        param: "unique",
        reason,
    };
    match toggle {
        None => Err(SchemaError::MissingParameter {
            field: field.to_string(),
            param: "unique",
        }),
        Some(Toggle::Flag(true)) => Ok(Some(1)),
        Some(Toggle::Flag(false)) => Ok(None),
        Some(Toggle::Count(n)) if *n >= 1 => Ok(Some(*n as u32)),
        Some(Toggle::Count(-1)) => Ok(None),
        Some(Toggle::Count(n)) => Err(invalid(format!("count must be positive, got {}", n))),
        Some(Toggle::Word(word)) => match word.to_lowercase().as_str() {
            "y" | "yes" => Ok(Some(1)),
            "n" | "no" => Ok(None),
            other => Err(invalid(format!("unrecognized value `{}`", other))),
        },
    }
}

fn required_argument(
    field: &str,
    arg: Option<&IndexMap<String, String>>,
    param: &'static str,
) -> Result<String, SchemaError> {
    arg.and_then(|a| a.get(param))
        .cloned()
        .ok_or_else(|| SchemaError::MissingParameter {
            field: field.to_string(),
            param,
        })
}

/// Resolve a regex validator's pattern: an inline `regexExpression` or a
/// `fileName` + `valueName` pair naming an enumerated-values file. The two
/// forms are mutually exclusive; anything else is fatal.
fn regex_argument(
    field: &str,
    arg: Option<&IndexMap<String, String>>,
    files: &dyn FileSource,
) -> Result<Regex, SchemaError> {
    let arg = arg.ok_or_else(|| SchemaError::MissingParameter {
        field: field.to_string(),
        param: "argument",
    })?;
    let expression = arg.get("regexExpression");
    let file_name = arg.get("fileName");
    let value_name = arg.get("valueName");

    match (expression, file_name, value_name) {
        (Some(expr), None, None) => anchored(field, expr),
        (None, Some(file), Some(key)) => {
            let values = read_values(field, file, key, files)?;
            anchored(field, &values.join("|"))
        }
        (None, Some(_), None) => Err(SchemaError::MissingParameter {
            field: field.to_string(),
            param: "valueName",
        }),
        (None, None, Some(_)) => Err(SchemaError::MissingParameter {
            field: field.to_string(),
            param: "fileName",
        }),
        (None, None, None) => Err(SchemaError::MissingParameter {
            field: field.to_string(),
            param: "regexExpression",
        }),
        _ => Err(SchemaError::InvalidParameter {
            field: field.to_string(),
            param: "argument",
            reason: "regexExpression and fileName/valueName are mutually exclusive".to_string(),
        }),
    }
}

/// Resolve the category validator's enumerated value set from its
/// `fileName` + `valueName` arguments.
fn enumerated_values(
    field: &str,
    arg: Option<&IndexMap<String, String>>,
    files: &dyn FileSource,
) -> Result<Vec<String>, SchemaError> {
    let file = required_argument(field, arg, "fileName")?;
    let key = required_argument(field, arg, "valueName")?;
    read_values(field, &file, &key, files)
}

fn read_values(
    field: &str,
    file: &str,
    key: &str,
    files: &dyn FileSource,
) -> Result<Vec<String>, SchemaError> {
    let content = files
        .read_file(file)
        .map_err(|source| SchemaError::ValuesFile {
            name: file.to_string(),
            source,
        })?;
    let value: serde_json::Value =
        serde_saphyr::from_str(&content).map_err(|e| SchemaError::Syntax(e.to_string()))?;
    let mut sections: IndexMap<String, Vec<ValueEntry>> = serde_json::from_value(value)
        .map_err(|e| SchemaError::InvalidParameter {
            field: field.to_string(),
            param: "fileName",
            reason: format!("values file `{}` is malformed: {}", file, e),
        })?;
    let entries = sections
        .swap_remove(key)
        .ok_or_else(|| SchemaError::MissingValues {
            name: file.to_string(),
            key: key.to_string(),
        })?;
    Ok(entries.into_iter().map(|e| e.value).collect())
}

/// Compile an expression wrapped so that matching is whole-string, the way
/// every value check in this crate is performed.
fn anchored(field: &str, expression: &str) -> Result<Regex, SchemaError> {
    Regex::new(&format!("^(?:{})$", expression)).map_err(|source| SchemaError::Pattern {
        field: field.to_string(),
        source: Box::new(source),
    })
}
