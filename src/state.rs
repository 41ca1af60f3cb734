//! Per-rule scratch state.
//!
//! The compiled [`Schema`](crate::schema::Schema) is immutable for the life
//! of a validator; everything a single validation call mutates lives here and
//! is rebuilt fresh for every rule, so no state leaks between rules.

use crate::schema::{Optionality, Schema};
use indexmap::IndexMap;

/// Canonical-position tracker for one schema field.
///
/// Invariant: `index() = starting_index + offset`, and the offset cycles
/// modulo `count`, which places multiple occurrences of a field contiguously
/// and in original relative order inside the field's reserved slot range.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Positional {
    pub starting_index: usize,
    pub count: usize,
    offset: usize,
}

impl Positional {
    pub fn new(starting_index: usize) -> Self {
        Positional {
            starting_index,
            count: 0,
            offset: 0,
        }
    }

    pub fn increment_offset(&mut self) {
        self.offset += 1;
        if self.offset >= self.count {
            self.offset = 0;
        }
    }

    pub fn index(&self) -> usize {
        self.starting_index + self.offset
    }
}

/// Rule-scoped occurrence state for one schema field.
///
/// `optionality` starts as the schema's declaration and is escalated in place
/// by conditional-requirement validators (source → reference, actor →
/// actor-type, config dumper ↔ parser).
#[derive(Clone, Copy, Debug)]
pub(crate) struct FieldState {
    pub found: bool,
    pub valid: bool,
    pub optionality: Optionality,
}

/// All mutable state for one validation call.
pub(crate) struct RuleState {
    /// Occurrence state, indexed by schema declaration position.
    pub states: Vec<FieldState>,
    /// Position trackers, indexed by schema declaration position.
    pub positions: Vec<Positional>,
    /// Active child fields: runtime tag name → placeholder position.
    ///
    /// A child is dormant until its parent's validator inserts it here; the
    /// placeholder's tracker and state double as the child's, so nothing
    /// recorded before promotion is lost.
    pub children: IndexMap<String, usize>,
    /// Actor alias captured for later knowledge-base group resolution.
    pub actor_alias: Option<String>,
}

impl RuleState {
    pub fn new(schema: &Schema) -> Self {
        let states = schema
            .fields()
            .map(|def| FieldState {
                found: false,
                valid: false,
                optionality: def.optionality,
            })
            .collect();
        let positions = (0..schema.len()).map(Positional::new).collect();
        RuleState {
            states,
            positions,
            children: IndexMap::new(),
            actor_alias: None,
        }
    }
}
