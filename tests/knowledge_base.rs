use std::fs;

use yaramd::kb::kind_for_id;
use yaramd::{EntityKind, KnowledgeBase, StixStore};

const BUNDLE: &str = r#"{
  "type": "bundle",
  "id": "bundle--0001",
  "objects": [
    {
      "type": "intrusion-set",
      "name": "Boreal Wind",
      "aliases": ["Boreal Wind", "FROSTBITE", "Cold River"],
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "G0099"}
      ]
    },
    {
      "type": "attack-pattern",
      "name": "Scripted Execution",
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "T1234"}
      ]
    },
    {
      "type": "x-mitre-tactic",
      "name": "Execution",
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "TA0042"}
      ]
    },
    {
      "type": "course-of-action",
      "name": "Restrict Execution",
      "external_references": [
        {"source_name": "mitre-attack", "external_id": "M5555"}
      ]
    },
    {
      "type": "relationship",
      "source_ref": "intrusion-set--x",
      "target_ref": "attack-pattern--y"
    }
  ]
}"#;

const MALWARE_OBJECT: &str = r#"{
  "type": "malware",
  "name": "Icicle Loader",
  "external_references": [
    {"source_name": "mitre-attack", "external_id": "S0001"}
  ]
}"#;

const TOOL_OBJECT: &str = r#"{
  "type": "tool",
  "name": "Chisel Wrapper",
  "external_references": [
    {"source_name": "mitre-attack", "external_id": "S0002"}
  ]
}"#;

fn store() -> StixStore {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("enterprise.json"), BUNDLE).unwrap();
    // single-object files in a nested directory, MITRE CTI layout style
    let nested = dir.path().join("malware");
    fs::create_dir(&nested).unwrap();
    fs::write(nested.join("s0001.json"), MALWARE_OBJECT).unwrap();
    fs::write(nested.join("s0002.json"), TOOL_OBJECT).unwrap();
    StixStore::load_dir(dir.path()).unwrap()
}

#[test]
fn alias_lookup_is_case_insensitive() {
    let store = store();
    assert_eq!(
        store.group_name_for_alias("frostbite").unwrap(),
        Some("Boreal Wind".to_string())
    );
    assert_eq!(
        store.group_name_for_alias("COLD RIVER").unwrap(),
        Some("Boreal Wind".to_string())
    );
    assert_eq!(store.group_name_for_alias("NOBODY").unwrap(), None);
}

#[test]
fn entities_resolve_by_kind() {
    let store = store();
    assert!(store.has_entity(EntityKind::Technique, "T1234").unwrap());
    assert!(store.has_entity(EntityKind::Tactic, "TA0042").unwrap());
    assert!(store.has_entity(EntityKind::Group, "G0099").unwrap());
    assert!(store.has_entity(EntityKind::Mitigation, "M5555").unwrap());
    // software spans malware and tool entities
    assert!(store.has_entity(EntityKind::Software, "S0001").unwrap());
    assert!(store.has_entity(EntityKind::Software, "S0002").unwrap());
}

#[test]
fn kind_scoping_excludes_other_kinds() {
    let store = store();
    assert!(!store.has_entity(EntityKind::Technique, "TA0042").unwrap());
    assert!(!store.has_entity(EntityKind::Group, "T1234").unwrap());
    assert!(!store.has_entity(EntityKind::Technique, "T9999").unwrap());
}

#[test]
fn unscoped_queries_match_any_kind() {
    let store = store();
    assert!(store.has_entity(EntityKind::Any, "T1234").unwrap());
    assert!(store.has_entity(EntityKind::Any, "S0002").unwrap());
    assert!(!store.has_entity(EntityKind::Any, "X0000").unwrap());
}

#[test]
fn identifier_prefixes_dispatch_to_the_right_kind() {
    assert_eq!(kind_for_id("TA0001"), EntityKind::Tactic);
    assert_eq!(kind_for_id("T1059"), EntityKind::Technique);
    assert_eq!(kind_for_id("S0154"), EntityKind::Software);
    assert_eq!(kind_for_id("G0008"), EntityKind::Group);
    assert_eq!(kind_for_id("M1040"), EntityKind::Mitigation);
    assert_eq!(kind_for_id("X9999"), EntityKind::Any);
}

#[test]
fn malformed_store_content_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("broken.json"), "{ not json").unwrap();
    assert!(StixStore::load_dir(dir.path()).is_err());
}
