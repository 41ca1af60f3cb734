use std::collections::HashMap;

use yaramd::{
    MemoryKnowledgeBase, MetaTag, MetaValue, Rule, Schema, StringDef, StringKind, Validator,
};

fn tag(key: &str, value: &str) -> MetaTag {
    MetaTag::pair(key, value)
}

fn rule_with(metadata: Vec<MetaTag>) -> Rule {
    Rule {
        rule_name: "sample".to_string(),
        tags: vec![],
        scopes: vec![],
        metadata: Some(metadata),
        strings: vec![StringDef {
            name: "$a".to_string(),
            value: "evil".to_string(),
            kind: StringKind::Text,
            modifiers: Some(vec!["ascii".to_string()]),
        }],
        condition_terms: vec!["all".to_string(), "of".to_string(), "them".to_string()],
    }
}

fn baseline_meta() -> Vec<MetaTag> {
    vec![
        tag("status", "DEPLOYED"),
        tag("sharing", "TLP:GREEN"),
        tag("source", "VENDOR"),
        tag("author", "analyst@example.org"),
        tag("description", "Detects the sample"),
        tag("category", "MALWARE"),
        tag("malware", "RANSOM"),
    ]
}

fn validator() -> Validator {
    Validator::new(
        Schema::builtin().unwrap(),
        Box::new(MemoryKnowledgeBase::default()),
    )
}

fn keys(rule: &Rule) -> Vec<String> {
    rule.meta()
        .iter()
        .filter_map(MetaTag::key)
        .map(str::to_string)
        .collect()
}

// ─── Canonical field order ──────────────────────────────────────────────────

#[test]
fn metadata_is_rewritten_into_declaration_order() {
    let v = validator();
    // scrambled relative to the canonical order
    let mut rule = rule_with(vec![
        tag("description", "Detects the sample"),
        tag("malware", "RANSOM"),
        tag("author", "analyst@example.org"),
        tag("category", "MALWARE"),
        tag("source", "VENDOR"),
        tag("status", "DEPLOYED"),
        tag("sharing", "TLP:GREEN"),
    ]);
    let source = yaramd::render_rule(&rule);
    let report = v.validate(&mut rule, &source);
    assert!(report.is_valid(), "diagnostics: {}", report.errors());
    assert_eq!(
        keys(&rule),
        vec![
            "id",
            "fingerprint",
            "version",
            "first_imported",
            "last_modified",
            "status",
            "sharing",
            "source",
            "author",
            "description",
            "category",
            "malware",
        ]
    );
}

/// Fields A, B, C declared in that order; two occurrences of B and none of A
/// place both Bs contiguously where A would have been, with C right after.
#[test]
fn absent_fields_slide_later_slots_left() {
    let config = r#"
alpha:
  optional: "yes"
  unique: "yes"
  validator: valid_regex
  argument:
    regexExpression: ".*"
beta:
  optional: "yes"
  unique: 3
  validator: valid_regex
  argument:
    regexExpression: ".*"
gamma:
  optional: "yes"
  unique: "yes"
  validator: valid_regex
  argument:
    regexExpression: ".*"
"#;
    let schema = Schema::compile(config, &HashMap::new()).unwrap();
    let v = Validator::new(schema, Box::new(MemoryKnowledgeBase::default()));

    let mut rule = rule_with(vec![
        tag("gamma", "G"),
        tag("beta", "FIRST"),
        tag("beta", "SECOND"),
    ]);
    let source = yaramd::render_rule(&rule);
    let report = v.validate(&mut rule, &source);
    assert!(report.is_valid(), "diagnostics: {}", report.errors());
    assert_eq!(keys(&rule), vec!["beta", "beta", "gamma"]);
    // occurrences keep their original relative order inside the slot
    let values: Vec<String> = rule
        .meta()
        .iter()
        .filter_map(MetaTag::value)
        .map(MetaValue::to_string)
        .collect();
    assert_eq!(values, vec!["FIRST", "SECOND", "G"]);
}

#[test]
fn unrecognized_and_multi_key_tags_are_appended_in_relative_order() {
    let v = validator();
    let mut meta = baseline_meta();
    meta.insert(0, tag("zzz_custom", "one"));
    let mut malformed = MetaTag::pair("left", "1");
    malformed.0.insert("right".to_string(), MetaValue::from("2"));
    meta.insert(3, malformed);
    let mut rule = rule_with(meta);
    let source = yaramd::render_rule(&rule);
    let report = v.validate(&mut rule, &source);
    assert!(report.is_valid(), "diagnostics: {}", report.errors());

    let all = keys(&rule);
    let tail = &all[all.len() - 2..];
    assert_eq!(tail, ["zzz_custom", "left"]);
}

// ─── Text splicing ──────────────────────────────────────────────────────────

#[test]
fn splice_preserves_everything_outside_the_metadata_block() {
    let v = validator();
    let mut rule = rule_with(baseline_meta());
    let source = "\
// Hunting rule for the winter campaign
rule sample
{
    meta:
        status = \"DEPLOYED\"
        sharing = \"TLP:GREEN\"
        source = \"VENDOR\"
        author = \"analyst@example.org\"
        description = \"Detects the sample\"
        category = \"MALWARE\"
        malware = \"RANSOM\"
    strings:
        $a = \"evil\" ascii    // keep me
    condition:
        all of them
}";
    let report = v.validate(&mut rule, source);
    assert!(report.is_valid(), "diagnostics: {}", report.errors());
    let canonical = report.canonical_rule().unwrap();

    assert!(canonical.starts_with("// Hunting rule for the winter campaign\n"));
    assert!(canonical.contains("$a = \"evil\" ascii    // keep me"));
    // the original strings/condition tail is untouched
    let original_tail = &source[source.find("    strings:").unwrap()..];
    let canonical_tail = &canonical[canonical.find("    strings:").unwrap()..];
    assert_eq!(original_tail, canonical_tail);
    // the metadata block was rewritten: generated fields lead the section
    let meta_at = canonical.find("    meta:").unwrap();
    let id_at = canonical.find("        id = ").unwrap();
    let status_at = canonical.find("        status = ").unwrap();
    assert!(meta_at < id_at && id_at < status_at);
}

#[test]
fn validating_a_canonical_rule_is_a_fixed_point() {
    let v = validator();
    let mut rule = rule_with(baseline_meta());
    let source = yaramd::render_rule(&rule);
    let first = v.validate(&mut rule, &source);
    assert!(first.is_valid(), "diagnostics: {}", first.errors());
    let canonical_once = first.canonical_rule().unwrap().to_string();

    // second run over the already-canonicalized rule and text
    let second = v.validate(&mut rule, &canonical_once);
    assert!(second.is_valid(), "diagnostics: {}", second.errors());
    assert_eq!(second.canonical_rule().unwrap(), canonical_once);
}

#[test]
fn original_text_is_reported_verbatim() {
    let v = validator();
    let mut rule = rule_with(baseline_meta());
    let source = yaramd::render_rule(&rule);
    let report = v.validate(&mut rule, &source);
    assert_eq!(report.original_rule(), source);
}

// ─── Rendering ──────────────────────────────────────────────────────────────

#[test]
fn render_rule_produces_standard_layout() {
    let rule = Rule {
        rule_name: "demo".to_string(),
        tags: vec!["implant".to_string()],
        scopes: vec!["private".to_string()],
        metadata: Some(vec![tag("author", "analyst"), MetaTag::pair("volume", MetaValue::Int(3))]),
        strings: vec![
            StringDef {
                name: "$text".to_string(),
                value: "payload".to_string(),
                kind: StringKind::Text,
                modifiers: Some(vec!["ascii".to_string(), "wide".to_string()]),
            },
            StringDef {
                name: "$bytes".to_string(),
                value: "{ AB ?? CD }".to_string(),
                kind: StringKind::Byte,
                modifiers: None,
            },
        ],
        condition_terms: vec!["any".to_string(), "of".to_string(), "them".to_string()],
    };
    let rendered = yaramd::render_rule(&rule);
    assert_eq!(
        rendered,
        "private rule demo : implant\n\
         {\n\
         \x20   meta:\n\
         \x20       author = \"analyst\"\n\
         \x20       volume = 3\n\
         \x20   strings:\n\
         \x20       $text = \"payload\" ascii wide\n\
         \x20       $bytes = { AB ?? CD }\n\
         \x20   condition:\n\
         \x20       any of them\n\
         }"
    );
}
