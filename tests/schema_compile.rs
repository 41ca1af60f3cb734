use std::collections::HashMap;

use yaramd::{Schema, SchemaError};

fn compile(config: &str) -> Result<Schema, SchemaError> {
    Schema::compile(config, &HashMap::new())
}

fn compile_with(config: &str, files: &[(&str, &str)]) -> Result<Schema, SchemaError> {
    let files: HashMap<String, String> = files
        .iter()
        .map(|(name, content)| (name.to_string(), content.to_string()))
        .collect();
    Schema::compile(config, &files)
}

// ─── The embedded default ───────────────────────────────────────────────────

#[test]
fn builtin_schema_compiles() {
    let schema = Schema::builtin().unwrap();
    assert_eq!(schema.len(), 21);
    assert_eq!(schema.get("id").unwrap().position, 0);
    // child fields are registered under placeholder keys until promoted
    assert!(schema.get("mitre_group").is_none());
    assert!(schema.get("mitre_group_child").is_some());
    assert!(schema.get("category_type").is_none());
    assert!(schema.get("category_type_child").is_some());
    assert!(schema.is_category_value("MALWARE"));
    assert!(schema.is_category_value("malware"));
    assert!(!schema.is_category_value("PONY"));
}

// ─── Fatal declaration defects ──────────────────────────────────────────────

#[test]
fn unknown_validator_is_fatal() {
    let err = compile(
        r#"
status:
  optional: "no"
  unique: "yes"
  validator: valid_nonsense
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::UnknownValidator { .. }));
}

#[test]
fn missing_optional_parameter_is_fatal() {
    let err = compile(
        r#"
status:
  unique: "yes"
  validator: valid_uuid
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingParameter { param: "optional", .. }
    ));
}

#[test]
fn unrecognized_optional_value_is_fatal() {
    let err = compile(
        r#"
status:
  optional: maybe
  unique: "yes"
  validator: valid_uuid
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::InvalidParameter { param: "optional", .. }
    ));
}

#[test]
fn missing_unique_parameter_is_fatal() {
    let err = compile(
        r#"
status:
  optional: "no"
  validator: valid_uuid
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingParameter { param: "unique", .. }
    ));
}

#[test]
fn missing_validator_is_fatal() {
    let err = compile(
        r#"
status:
  optional: "no"
  unique: "yes"
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingParameter { param: "validator", .. }
    ));
}

// ─── Regex argument contract ────────────────────────────────────────────────

#[test]
fn regex_validator_without_argument_is_fatal() {
    let err = compile(
        r#"
status:
  optional: "no"
  unique: "yes"
  validator: valid_regex
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingParameter { param: "argument", .. }
    ));
}

#[test]
fn inline_pattern_and_values_file_are_mutually_exclusive() {
    let err = compile_with(
        r#"
status:
  optional: "no"
  unique: "yes"
  validator: valid_regex
  argument:
    regexExpression: "^A$"
    fileName: values.yml
    valueName: statuses
"#,
        &[("values.yml", "statuses:\n  - value: A\n")],
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::InvalidParameter { param: "argument", .. }
    ));
}

#[test]
fn file_name_without_value_name_is_fatal() {
    let err = compile(
        r#"
status:
  optional: "no"
  unique: "yes"
  validator: valid_regex
  argument:
    fileName: values.yml
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::MissingParameter { param: "valueName", .. }
    ));
}

#[test]
fn unreadable_values_file_is_fatal() {
    let err = compile(
        r#"
status:
  optional: "no"
  unique: "yes"
  validator: valid_regex
  argument:
    fileName: nowhere.yml
    valueName: statuses
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::ValuesFile { .. }));
}

#[test]
fn missing_values_key_is_fatal() {
    let err = compile_with(
        r#"
status:
  optional: "no"
  unique: "yes"
  validator: valid_regex
  argument:
    fileName: values.yml
    valueName: statuses
"#,
        &[("values.yml", "other:\n  - value: A\n")],
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::MissingValues { .. }));
}

#[test]
fn malformed_inline_pattern_is_fatal() {
    let err = compile(
        r#"
status:
  optional: "no"
  unique: "yes"
  validator: valid_regex
  argument:
    regexExpression: "(["
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::Pattern { .. }));
}

// ─── Relationship cross-checks ──────────────────────────────────────────────

#[test]
fn dangling_child_reference_is_fatal() {
    let err = compile(
        r#"
actor_type:
  optional: "yes"
  unique: "yes"
  validator: valid_regex
  argument:
    regexExpression: "^[A-Z]+$"
actor:
  optional: "yes"
  unique: "yes"
  validator: valid_actor
  argument:
    child: mitre_group
    required: actor_type
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::DanglingReference { .. }));
}

#[test]
fn dangling_required_reference_is_fatal() {
    let err = compile(
        r#"
source:
  optional: "no"
  unique: "yes"
  validator: valid_source
  argument:
    required: reference
"#,
    )
    .unwrap_err();
    assert!(matches!(err, SchemaError::DanglingReference { .. }));
}

#[test]
fn child_that_declares_no_parent_is_fatal() {
    let err = compile(
        r#"
actor_type:
  optional: "yes"
  unique: "yes"
  validator: valid_regex
  argument:
    regexExpression: "^[A-Z]+$"
mitre_group:
  optional: "yes"
  unique: "yes"
  validator: valid_regex
  argument:
    regexExpression: ".*"
actor:
  optional: "yes"
  unique: "yes"
  validator: valid_actor
  argument:
    child: mitre_group
    required: actor_type
"#,
    )
    .unwrap_err();
    assert!(matches!(
        err,
        SchemaError::InvalidParameter { param: "child", .. }
    ));
}

#[test]
fn configuration_must_be_yaml() {
    let err = compile("status: [not: a: mapping").unwrap_err();
    assert!(matches!(err, SchemaError::Syntax(_)));
}
