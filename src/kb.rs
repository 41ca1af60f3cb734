//! The threat-intelligence knowledge base interface.
//!
//! Validators query a typed entity store — techniques, tactics, software,
//! groups, mitigations — through the [`KnowledgeBase`] trait, injected into
//! the orchestrator so callers can swap the backing store. [`StixStore`]
//! reads a MITRE ATT&CK-style directory of STIX 2.x bundle JSON;
//! [`MemoryKnowledgeBase`] is an in-memory implementation for tests and
//! small fixed datasets.

use crate::error::KbError;
use serde_json::Value;
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// The entity kinds a knowledge-base query can be scoped to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Tactic,
    Technique,
    Software,
    Group,
    Mitigation,
    /// Unscoped catch-all: matches any kind.
    Any,
}

/// Map an external identifier to its query scope by prefix: `TA` → tactic,
/// `T` → technique, `S` → software, `G` → group, `M` → mitigation, anything
/// else unscoped.
pub fn kind_for_id(id: &str) -> EntityKind {
    if id.starts_with("TA") {
        EntityKind::Tactic
    } else if id.starts_with('T') {
        EntityKind::Technique
    } else if id.starts_with('S') {
        EntityKind::Software
    } else if id.starts_with('G') {
        EntityKind::Group
    } else if id.starts_with('M') {
        EntityKind::Mitigation
    } else {
        EntityKind::Any
    }
}

/// A queryable threat-intelligence store.
///
/// Queries are exact-match filters; alias matching is case-insensitive.
/// Lookup misses are `Ok` results — errors are reserved for transport and
/// content failures, which validators treat as per-field failures.
pub trait KnowledgeBase: Send + Sync {
    /// Resolve a group alias to the canonical group name.
    fn group_name_for_alias(&self, alias: &str) -> Result<Option<String>, KbError>;

    /// Whether any entity of `kind` carries the external identifier `id`.
    fn has_entity(&self, kind: EntityKind, id: &str) -> Result<bool, KbError>;
}

// ─── STIX filesystem store ──────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StixType {
    AttackPattern,
    IntrusionSet,
    Malware,
    Tool,
    Tactic,
    CourseOfAction,
}

impl StixType {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "attack-pattern" => Some(StixType::AttackPattern),
            "intrusion-set" => Some(StixType::IntrusionSet),
            "malware" => Some(StixType::Malware),
            "tool" => Some(StixType::Tool),
            "x-mitre-tactic" => Some(StixType::Tactic),
            "course-of-action" => Some(StixType::CourseOfAction),
            _ => None,
        }
    }

    fn matches(self, kind: EntityKind) -> bool {
        match kind {
            EntityKind::Any => true,
            EntityKind::Tactic => self == StixType::Tactic,
            EntityKind::Technique => self == StixType::AttackPattern,
            EntityKind::Software => matches!(self, StixType::Malware | StixType::Tool),
            EntityKind::Group => self == StixType::IntrusionSet,
            EntityKind::Mitigation => self == StixType::CourseOfAction,
        }
    }
}

#[derive(Clone, Debug)]
struct StixEntity {
    kind: StixType,
    name: String,
    aliases: Vec<String>,
    external_ids: Vec<String>,
}

/// In-memory index over a directory of STIX 2.x bundle JSON files, laid out
/// the way the MITRE ATT&CK CTI repository ships its datasets.
#[derive(Clone, Debug)]
pub struct StixStore {
    entities: Vec<StixEntity>,
}

impl StixStore {
    /// Recursively load every `.json` file under `root`. Files may hold a
    /// STIX bundle (`{"objects": [...]}`) or a single object.
    pub fn load_dir(root: impl AsRef<Path>) -> Result<Self, KbError> {
        let mut entities = Vec::new();
        load_json_tree(root.as_ref(), &mut entities)?;
        info!(
            entities = entities.len(),
            "loaded threat intelligence knowledge base"
        );
        Ok(StixStore { entities })
    }
}

fn load_json_tree(dir: &Path, entities: &mut Vec<StixEntity>) -> Result<(), KbError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            load_json_tree(&path, entities)?;
        } else if path.extension().is_some_and(|ext| ext == "json") {
            let content = fs::read_to_string(&path)?;
            let value: Value = serde_json::from_str(&content).map_err(|e| {
                KbError::Malformed(format!("{}: {}", path.display(), e))
            })?;
            collect_objects(&value, entities);
            debug!(path = %path.display(), "indexed knowledge base file");
        }
    }
    Ok(())
}

fn collect_objects(value: &Value, entities: &mut Vec<StixEntity>) {
    match value.get("objects").and_then(Value::as_array) {
        Some(objects) => {
            for object in objects {
                if let Some(entity) = parse_entity(object) {
                    entities.push(entity);
                }
            }
        }
        None => {
            if let Some(entity) = parse_entity(value) {
                entities.push(entity);
            }
        }
    }
}

fn parse_entity(object: &Value) -> Option<StixEntity> {
    let kind = StixType::from_name(object.get("type")?.as_str()?)?;
    let name = object
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let aliases = object
        .get("aliases")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let external_ids = object
        .get("external_references")
        .and_then(Value::as_array)
        .map(|refs| {
            refs.iter()
                .filter_map(|r| r.get("external_id"))
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Some(StixEntity {
        kind,
        name,
        aliases,
        external_ids,
    })
}

impl KnowledgeBase for StixStore {
    fn group_name_for_alias(&self, alias: &str) -> Result<Option<String>, KbError> {
        Ok(self
            .entities
            .iter()
            .find(|e| {
                e.kind == StixType::IntrusionSet
                    && e.aliases.iter().any(|a| a.eq_ignore_ascii_case(alias))
            })
            .map(|e| e.name.clone()))
    }

    fn has_entity(&self, kind: EntityKind, id: &str) -> Result<bool, KbError> {
        Ok(self
            .entities
            .iter()
            .any(|e| e.kind.matches(kind) && e.external_ids.iter().any(|x| x == id)))
    }
}

// ─── In-memory store ────────────────────────────────────────────────────────

/// A hand-populated knowledge base, primarily for tests.
#[derive(Clone, Debug, Default)]
pub struct MemoryKnowledgeBase {
    groups: Vec<(String, Vec<String>)>,
    ids: Vec<(EntityKind, String)>,
}

impl MemoryKnowledgeBase {
    /// Register a group with its canonical name and aliases.
    pub fn add_group(&mut self, name: impl Into<String>, aliases: &[&str]) {
        self.groups
            .push((name.into(), aliases.iter().map(|a| a.to_string()).collect()));
    }

    /// Register an entity reachable by external identifier.
    pub fn add_entity(&mut self, kind: EntityKind, id: impl Into<String>) {
        self.ids.push((kind, id.into()));
    }
}

impl KnowledgeBase for MemoryKnowledgeBase {
    fn group_name_for_alias(&self, alias: &str) -> Result<Option<String>, KbError> {
        Ok(self
            .groups
            .iter()
            .find(|(_, aliases)| aliases.iter().any(|a| a.eq_ignore_ascii_case(alias)))
            .map(|(name, _)| name.clone()))
    }

    fn has_entity(&self, kind: EntityKind, id: &str) -> Result<bool, KbError> {
        Ok(self
            .ids
            .iter()
            .any(|(stored, stored_id)| {
                (kind == EntityKind::Any || *stored == kind) && stored_id == id
            }))
    }
}
