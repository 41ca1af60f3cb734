//! The per-field validator catalogue.
//!
//! Every validator runs against one tag occurrence — `(rule, tag_index)` —
//! or against the position a generated field should be inserted at. Side
//! effects on the rule are part of the contract: values are case-normalized,
//! generated tags are inserted, and unresolvable tags are removed. Returning
//! `false` marks the field invalid for this rule; the orchestrator records
//! the diagnostic.

use crate::fingerprint::fingerprint;
use crate::kb::{kind_for_id, KnowledgeBase};
use crate::schema::{FieldDef, Optionality, Schema, ValidatorKind};
use crate::state::RuleState;
use crate::types::{MetaTag, MetaValue, Rule};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;
use uuid::Uuid;

// ─── Fixed patterns and constants ───────────────────────────────────────────

static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Z 0-9.\-]+$").unwrap());

static BASE62_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9a-zA-Z]+$").unwrap());

static UNIVERSAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^a-z]*$").unwrap());

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+(\.[0-9]+)*$").unwrap());

/// Source value that escalates the reference field to required.
const OPEN_SOURCE: &str = "OPENSOURCE";

const DATE_FORMAT: &str = "%Y-%m-%d";

const BASE62_ALPHABET: &[u8; 62] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Identifier length bounds for a base-62 encoded 128-bit value.
const IDENTIFIER_LEN: std::ops::RangeInclusive<usize> = 20..=22;

// ─── Metadata access helpers ────────────────────────────────────────────────

pub(crate) fn in_bounds(rule: &Rule, index: usize) -> bool {
    index < rule.meta().len()
}

pub(crate) fn key_at(rule: &Rule, index: usize) -> Option<&str> {
    rule.meta().get(index).and_then(MetaTag::key)
}

/// Text form of the first value at `index`, empty when out of bounds.
pub(crate) fn value_text(rule: &Rule, index: usize) -> String {
    rule.meta()
        .get(index)
        .and_then(MetaTag::value)
        .map(MetaValue::to_string)
        .unwrap_or_default()
}

/// Replace the first value at `index`, keeping the key.
fn set_value_at(rule: &mut Rule, index: usize, value: MetaValue) {
    if let Some(tag) = rule.meta_mut().get_mut(index)
        && let Some(slot) = tag.0.values_mut().next()
    {
        *slot = value;
    }
}

/// Insert a tag at `index`, appending when the index is out of bounds.
fn place_tag(rule: &mut Rule, index: usize, tag: MetaTag) {
    let meta = rule.meta_mut();
    if index < meta.len() {
        meta.insert(index, tag);
    } else {
        meta.push(tag);
    }
}

fn base62_encode(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits: Vec<char> = Vec::new();
    while value > 0 {
        digits.push(BASE62_ALPHABET[(value % 62) as usize] as char);
        value /= 62;
    }
    digits.into_iter().rev().collect()
}

fn verify_identifier(value: &str) -> bool {
    BASE62_RE.is_match(value) && IDENTIFIER_LEN.contains(&value.len())
}

fn round_trips_as_date(value: &str) -> bool {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map(|date| date.format(DATE_FORMAT).to_string() == value)
        .unwrap_or(false)
}

// ─── Validation pass ────────────────────────────────────────────────────────

/// One validation call's dispatch context: the immutable schema and knowledge
/// base, plus the per-rule scratch state.
pub(crate) struct Pass<'a> {
    pub schema: &'a Schema,
    pub kb: &'a dyn KnowledgeBase,
    pub state: RuleState,
    pub today: NaiveDate,
}

impl<'a> Pass<'a> {
    pub fn new(schema: &'a Schema, kb: &'a dyn KnowledgeBase, today: NaiveDate) -> Self {
        Pass {
            schema,
            kb,
            state: RuleState::new(schema),
            today,
        }
    }

    /// Dispatch a tag to the registered field `key`. No-op `true` when the
    /// key is unregistered.
    pub fn dispatch(&mut self, rule: &mut Rule, tag_index: usize, key: &str) -> bool {
        let schema = self.schema;
        match schema.get(key) {
            Some(def) => self.run(def, rule, tag_index, key),
            None => true,
        }
    }

    /// Dispatch a tag to an *active child* field, or `None` when `key` has
    /// not been promoted by any parent this rule.
    pub fn dispatch_child(&mut self, rule: &mut Rule, tag_index: usize, key: &str) -> Option<bool> {
        let schema = self.schema;
        let position = self.state.children.get(key).copied()?;
        let def = schema.field_at(position)?;
        Some(self.run(def, rule, tag_index, key))
    }

    fn run(&mut self, def: &FieldDef, rule: &mut Rule, index: usize, invoked_as: &str) -> bool {
        match &def.validator {
            ValidatorKind::Regex { pattern } => self.check_regex(def, pattern, rule, index),
            ValidatorKind::Identifier => self.check_identifier(def, rule, index),
            ValidatorKind::Fingerprint => self.generate_fingerprint(def, rule, index),
            ValidatorKind::Version => self.check_version(def, rule, index),
            ValidatorKind::FirstImported => self.check_first_imported(def, rule, index),
            ValidatorKind::LastModified => self.stamp_last_modified(def, rule, index),
            ValidatorKind::Source { requires } => self.check_source(def, requires, rule, index),
            ValidatorKind::Category {
                child_placeholder,
                values,
            } => self.check_category(def, child_placeholder, values, rule, index),
            ValidatorKind::CategoryType { pattern } => {
                self.check_category_type(def, pattern, rule, index)
            }
            ValidatorKind::AttackId => self.check_attack_id(def, rule, index),
            ValidatorKind::Actor {
                requires,
                child,
                child_placeholder,
            } => self.check_actor(def, requires, child, child_placeholder, rule, index),
            ValidatorKind::GroupResolver { parent } => {
                self.resolve_group(def, parent, rule, index, invoked_as)
            }
            ValidatorKind::ConfigDumper { requires } | ValidatorKind::ConfigParser { requires } => {
                self.check_config_pair(def, requires, rule, index)
            }
        }
    }

    /// Record an occurrence of the field for this rule.
    fn observe(&mut self, def: &FieldDef) {
        self.state.states[def.position].found = true;
        self.state.positions[def.position].count += 1;
    }

    fn set_valid(&mut self, def: &FieldDef, valid: bool) -> bool {
        self.state.states[def.position].valid = valid;
        valid
    }

    /// Escalate a field to required-and-provided for this rule only.
    fn escalate(&mut self, name: &str) {
        if let Some(def) = self.schema.get(name) {
            self.state.states[def.position].optionality = Optionality::Required;
        }
    }

    /// Promote a dormant child: from here on, tags keyed `name` dispatch to
    /// the placeholder's slot.
    fn activate_child(&mut self, name: String, placeholder: &str) {
        if let Some(def) = self.schema.get(placeholder) {
            self.state.children.insert(name, def.position);
        }
    }

    // ─── Validators ─────────────────────────────────────────────────────────

    fn check_regex(&mut self, def: &FieldDef, pattern: &Regex, rule: &mut Rule, index: usize) -> bool {
        self.observe(def);
        let value = value_text(rule, index);
        if pattern.is_match(&value) {
            return self.set_valid(def, true);
        }
        let upper = value.to_uppercase();
        if pattern.is_match(&upper) {
            set_value_at(rule, index, MetaValue::Str(upper));
            return self.set_valid(def, true);
        }
        self.set_valid(def, false)
    }

    /// Generation and verification are mutually exclusive outcomes: an
    /// existing occurrence is verified, never regenerated.
    fn check_identifier(&mut self, def: &FieldDef, rule: &mut Rule, index: usize) -> bool {
        self.observe(def);
        if in_bounds(rule, index) && key_at(rule, index) == Some(def.name.as_str()) {
            let ok = verify_identifier(&value_text(rule, index));
            return self.set_valid(def, ok);
        }
        let generated = base62_encode(Uuid::new_v4().as_u128());
        place_tag(rule, index, MetaTag::pair(&def.name, generated));
        self.set_valid(def, true)
    }

    /// Fully derived: always recomputed, any existing occurrence overwritten.
    fn generate_fingerprint(&mut self, def: &FieldDef, rule: &mut Rule, index: usize) -> bool {
        self.observe(def);
        let hash = fingerprint(rule);
        let tag = MetaTag::pair(&def.name, hash);
        if in_bounds(rule, index) && key_at(rule, index) == Some(def.name.as_str()) {
            rule.meta_mut()[index] = tag;
        } else {
            place_tag(rule, index, tag);
        }
        self.set_valid(def, true)
    }

    fn check_version(&mut self, def: &FieldDef, rule: &mut Rule, index: usize) -> bool {
        self.observe(def);
        if in_bounds(rule, index) && key_at(rule, index) == Some(def.name.as_str()) {
            let ok = VERSION_RE.is_match(&value_text(rule, index));
            return self.set_valid(def, ok);
        }
        place_tag(rule, index, MetaTag::pair(&def.name, "1.0"));
        self.set_valid(def, true)
    }

    /// Fills with the current date when absent; an existing value must
    /// round-trip through `YYYY-MM-DD` exactly.
    fn check_first_imported(&mut self, def: &FieldDef, rule: &mut Rule, index: usize) -> bool {
        self.observe(def);
        if in_bounds(rule, index) && key_at(rule, index) == Some(def.name.as_str()) {
            let ok = round_trips_as_date(&value_text(rule, index));
            return self.set_valid(def, ok);
        }
        let today = self.today.format(DATE_FORMAT).to_string();
        place_tag(rule, index, MetaTag::pair(&def.name, today));
        self.set_valid(def, true)
    }

    /// Always stamped with the current date, existing value or not.
    fn stamp_last_modified(&mut self, def: &FieldDef, rule: &mut Rule, index: usize) -> bool {
        self.observe(def);
        let today = self.today.format(DATE_FORMAT).to_string();
        if in_bounds(rule, index) && key_at(rule, index) == Some(def.name.as_str()) {
            set_value_at(rule, index, MetaValue::Str(today));
        } else {
            place_tag(rule, index, MetaTag::pair(&def.name, today));
        }
        self.set_valid(def, true)
    }

    fn check_source(
        &mut self,
        def: &FieldDef,
        requires: &str,
        rule: &mut Rule,
        index: usize,
    ) -> bool {
        self.observe(def);
        let mut value = value_text(rule, index);
        if UNIVERSAL_RE.is_match(&value) {
            self.set_valid(def, true);
        } else {
            let upper = value.to_uppercase();
            if UNIVERSAL_RE.is_match(&upper) {
                set_value_at(rule, index, MetaValue::Str(upper.clone()));
                value = upper;
                self.set_valid(def, true);
            } else {
                self.set_valid(def, false);
            }
        }
        if value == OPEN_SOURCE {
            // Open-source provenance must carry a reference.
            self.escalate(requires);
        }
        self.state.states[def.position].valid
    }

    fn check_category(
        &mut self,
        def: &FieldDef,
        child_placeholder: &str,
        values: &[String],
        rule: &mut Rule,
        index: usize,
    ) -> bool {
        self.observe(def);
        let value = value_text(rule, index);
        if values.iter().any(|v| *v == value) {
            self.set_valid(def, true);
            self.activate_child(value.to_lowercase(), child_placeholder);
            return true;
        }
        let upper = value.to_uppercase();
        if values.iter().any(|v| *v == upper) {
            set_value_at(rule, index, MetaValue::Str(upper.clone()));
            self.set_valid(def, true);
            self.activate_child(upper.to_lowercase(), child_placeholder);
            return true;
        }
        self.set_valid(def, false)
    }

    fn check_category_type(
        &mut self,
        def: &FieldDef,
        pattern: &Regex,
        rule: &mut Rule,
        index: usize,
    ) -> bool {
        self.observe(def);
        let value = value_text(rule, index);
        if pattern.is_match(&value) {
            return self.set_valid(def, true);
        }
        let upper = value.to_uppercase();
        if pattern.is_match(&upper) {
            set_value_at(rule, index, MetaValue::Str(upper));
            return self.set_valid(def, true);
        }
        self.set_valid(def, false)
    }

    fn check_attack_id(&mut self, def: &FieldDef, rule: &mut Rule, index: usize) -> bool {
        self.observe(def);
        let value = value_text(rule, index).to_uppercase();
        set_value_at(rule, index, MetaValue::Str(value.clone()));
        match self.kb.has_entity(kind_for_id(&value), &value) {
            Ok(found) => self.set_valid(def, found),
            Err(error) => {
                warn!(field = %def.name, %error, "knowledge base lookup failed");
                self.set_valid(def, false)
            }
        }
    }

    fn check_actor(
        &mut self,
        def: &FieldDef,
        requires: &str,
        child: &str,
        child_placeholder: &str,
        rule: &mut Rule,
        index: usize,
    ) -> bool {
        // An actor is named, so its type becomes required.
        self.escalate(requires);
        self.observe(def);
        let value = value_text(rule, index);
        if ALIAS_RE.is_match(&value) {
            self.set_valid(def, true);
            self.activate_child(child.to_string(), child_placeholder);
            self.state.actor_alias = Some(value);
            return true;
        }
        let upper = value.to_uppercase();
        if ALIAS_RE.is_match(&upper) {
            set_value_at(rule, index, MetaValue::Str(upper.clone()));
            self.set_valid(def, true);
            self.activate_child(child.to_string(), child_placeholder);
            self.state.actor_alias = Some(upper);
            return true;
        }
        self.set_valid(def, false)
    }

    /// Resolve the captured actor alias to a canonical group name. A field
    /// that cannot be resolved must not appear: an existing occurrence is
    /// removed and the call still succeeds (the gap surfaces as a warning,
    /// not a failure).
    fn resolve_group(
        &mut self,
        def: &FieldDef,
        parent: &str,
        rule: &mut Rule,
        index: usize,
        invoked_as: &str,
    ) -> bool {
        let schema = self.schema;
        // Invoked either through the placeholder key (generation pass) or
        // through the active tag name (child dispatch); the tag written is
        // always named by the parent's child argument.
        let tag_name: String = if schema.get(invoked_as).is_some() {
            match schema.get(parent).map(|p| &p.validator) {
                Some(ValidatorKind::Actor { child, .. }) => child.clone(),
                _ => def.name.clone(),
            }
        } else {
            invoked_as.to_string()
        };

        let resolved = match &self.state.actor_alias {
            Some(alias) => match self.kb.group_name_for_alias(alias) {
                Ok(name) => name.map(|n| n.to_uppercase()),
                Err(error) => {
                    warn!(field = %def.name, %error, "knowledge base lookup failed");
                    return false;
                }
            },
            None => None,
        };

        let position = def.position;
        if in_bounds(rule, index) && key_at(rule, index) == Some(tag_name.as_str()) {
            match resolved {
                Some(group) => {
                    rule.meta_mut()[index] = MetaTag::pair(&tag_name, group);
                    self.mark_resolved(position);
                }
                None => {
                    rule.meta_mut().remove(index);
                    return true;
                }
            }
        } else {
            match resolved {
                Some(group) => {
                    place_tag(rule, index, MetaTag::pair(&tag_name, group));
                    self.mark_resolved(position);
                }
                None => return true,
            }
        }
        self.state.states[position].valid
    }

    fn mark_resolved(&mut self, position: usize) {
        self.state.states[position].found = true;
        self.state.states[position].valid = true;
        self.state.positions[position].count += 1;
    }

    /// Values are never checked; presence makes the paired field required.
    fn check_config_pair(
        &mut self,
        def: &FieldDef,
        requires: &str,
        _rule: &mut Rule,
        _index: usize,
    ) -> bool {
        self.observe(def);
        self.escalate(requires);
        self.set_valid(def, true)
    }
}
