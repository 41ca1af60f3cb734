//! Canonical metadata ordering.
//!
//! Once a rule is fully valid, its metadata is rewritten into the schema's
//! declaration order: every field's occurrences land contiguously in the
//! field's reserved slot range, absent fields contribute a zero-width slot
//! (so later fields slide left), and unrecognized or multi-key tags are
//! appended after all recognized slots in their original relative order.

use crate::schema::Schema;
use crate::state::RuleState;
use crate::types::{MetaTag, Rule};

/// Recompute every tracker's starting index from the final occurrence
/// counts: a left-to-right prefix sum over all fields' counts.
pub(crate) fn reindex(state: &mut RuleState) {
    let mut previous: Option<(usize, usize)> = None;
    for position in state.positions.iter_mut() {
        if let Some((start, count)) = previous {
            position.starting_index = start + count;
        }
        previous = Some((position.starting_index, position.count));
    }
}

/// Rewrite the rule's metadata sequence into canonical order.
///
/// Walks the tags in original order, placing each recognized tag at its
/// tracker's current index and consuming one offset, so repeated fields keep
/// their original relative order inside their slot. Expects [`reindex`] to
/// have run; the slot ranges then tile `0..recognized_count` exactly.
pub(crate) fn resort_metadata(rule: &mut Rule, schema: &Schema, state: &mut RuleState) {
    let Some(metadata) = rule.metadata.take() else {
        return;
    };
    let mut placed: Vec<Option<MetaTag>> = vec![None; metadata.len()];
    let mut leftovers: Vec<MetaTag> = Vec::new();

    for tag in metadata {
        let slot = tag.single().and_then(|(key, _)| {
            schema
                .get(key)
                .map(|def| def.position)
                .or_else(|| state.children.get(key).copied())
        });
        match slot {
            Some(position) => {
                let tracker = &mut state.positions[position];
                placed[tracker.index()] = Some(tag);
                tracker.increment_offset();
            }
            None => leftovers.push(tag),
        }
    }

    let mut ordered: Vec<MetaTag> = placed.into_iter().flatten().collect();
    ordered.extend(leftovers);
    rule.metadata = Some(ordered);
}
