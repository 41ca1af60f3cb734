//! The validation orchestrator.
//!
//! Drives one rule through the pipeline: structural pre-checks, per-tag
//! dispatch, the reverse-order child pass, empty-tag removal, generation of
//! missing-but-generatable fields, the required/cardinality sweep,
//! canonicalization (valid rules only), and the warning pass.

use crate::error::ValidationReport;
use crate::kb::KnowledgeBase;
use crate::normalize::{reindex, resort_metadata};
use crate::schema::{Optionality, Schema, ValidatorKind};
use crate::serialize::{render_rule, splice_metadata};
use crate::types::Rule;
use crate::validators::{value_text, Pass};
use chrono::Local;
use tracing::debug;

const METADATA_KEY: &str = "metadata";
const ASCII_KEY: &str = "ascii";
const SCOPES_KEY: &str = "scopes";

const GLOBAL_SCOPE: &str = "global";
const AUTHOR: &str = "author";
const REPORT: &str = "report";
const HASH: &str = "hash";

/// The validation engine: a compiled schema plus an injected knowledge base.
///
/// Construction is cheap relative to schema compilation, and one instance is
/// reusable across any number of rules — every call builds its own per-rule
/// state, so no state leaks between validations.
pub struct Validator {
    schema: Schema,
    kb: Box<dyn KnowledgeBase>,
    organization_author: Option<String>,
}

impl Validator {
    pub fn new(schema: Schema, kb: Box<dyn KnowledgeBase>) -> Self {
        Validator {
            schema,
            kb,
            organization_author: None,
        }
    }

    /// Set the organizational author identity the warning heuristics look
    /// for. Without one, the author-based heuristics stay disabled.
    pub fn with_organization_author(mut self, author: impl Into<String>) -> Self {
        self.organization_author = Some(author.into());
        self
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Validate one rule against the schema, mutating it into normalized
    /// form. `source` is the raw rule text the structured rule was parsed
    /// from; for valid rules the canonicalized text is spliced into it.
    pub fn validate(&self, rule: &mut Rule, source: &str) -> ValidationReport {
        debug!(rule = %rule.rule_name, "validating rule");
        let mut report = ValidationReport::new(source);

        // Structural pre-checks: terminal, and only the first failure is
        // reported — everything downstream assumes their absence.
        if rule.metadata.is_none() {
            report.update_validity(false, METADATA_KEY, "no metadata section present");
            return report;
        }
        if !source.is_ascii() {
            report.update_validity(false, ASCII_KEY, "non-ASCII characters present in the rule");
            return report;
        }
        if rule.scopes.iter().any(|scope| scope == GLOBAL_SCOPE) {
            report.update_validity(false, SCOPES_KEY, "global rules are not accepted");
            return report;
        }

        let mut pass = Pass::new(&self.schema, self.kb.as_ref(), Local::now().date_naive());

        // First pass: dispatch tags whose key is a registered field. Tags
        // that might belong to a not-yet-activated child are deferred; the
        // deferred queue is processed in reverse so that removals never
        // shift indices still waiting to be checked.
        let mut empty_tags: Vec<usize> = Vec::new();
        let mut deferred: Vec<(String, usize)> = Vec::new();
        let total = rule.meta().len();
        for index in 0..total {
            let Some((key, value)) = rule
                .meta()
                .get(index)
                .and_then(|tag| tag.single())
                .map(|(k, v)| (k.to_string(), v.clone()))
            else {
                continue;
            };
            if value.is_empty_text() {
                empty_tags.push(index);
            } else if self.schema.get(&key).is_some() {
                if !pass.dispatch(rule, index, &key) {
                    let shown = value_text(rule, index);
                    report.update_validity(
                        false,
                        &key,
                        format!("field has an invalid value: {}", shown),
                    );
                }
            } else if self.schema.get(&key.to_lowercase()).is_some() {
                report.update_warning(
                    &key,
                    "metadata tag would be validated if it were lowercase",
                );
            } else {
                deferred.push((key, index));
            }
        }

        // Child pass: only keys activated as children during the first pass
        // dispatch here. With several parent occurrences this is a
        // best-effort positional match, not a guaranteed pairing.
        for (key, index) in deferred.into_iter().rev() {
            if let Some(false) = pass.dispatch_child(rule, index, &key) {
                let shown = value_text(rule, index);
                report.update_validity(
                    false,
                    &key,
                    format!("field has an invalid value: {}", shown),
                );
            }
        }

        // Empty tags queued in the first pass, removed highest index first.
        // Re-checked because the child pass may have shifted the tail.
        for index in empty_tags.into_iter().rev() {
            if rule
                .meta()
                .get(index)
                .and_then(|tag| tag.value())
                .is_some_and(|value| value.is_empty_text())
            {
                rule.meta_mut().remove(index);
            }
        }

        self.generate_missing(rule, &mut pass);
        self.requirement_sweep(&pass, &mut report);

        if report.is_valid() {
            reindex(&mut pass.state);
            resort_metadata(rule, &self.schema, &mut pass.state);
            let canonical = splice_metadata(source, &render_rule(rule));
            report.set_canonical(canonical);
        }

        self.warning_pass(rule, &pass, &mut report);
        report
    }

    /// Invoke the validator of every required-but-generatable field that was
    /// never found, at the field's current canonical insertion point, so it
    /// is created even though no input tag referenced it. Regex-backed
    /// fields have no generation behavior and are simply marked found. The
    /// group placeholder joins the list when an alias was captured but
    /// never resolved.
    fn generate_missing(&self, rule: &mut Rule, pass: &mut Pass<'_>) {
        let mut keys: Vec<String> = self
            .schema
            .entries()
            .filter(|(_, def)| {
                pass.state.states[def.position].optionality == Optionality::Generatable
                    && !pass.state.states[def.position].found
            })
            .map(|(key, _)| key.to_string())
            .collect();

        if pass.state.actor_alias.is_some()
            && let Some(actor_def) = self
                .schema
                .fields()
                .find(|def| matches!(def.validator, ValidatorKind::Actor { .. }))
            && pass.state.states[actor_def.position].found
            && let ValidatorKind::Actor {
                child_placeholder, ..
            } = &actor_def.validator
        {
            keys.push(child_placeholder.clone());
        }

        for key in keys {
            let Some(def) = self.schema.get(&key) else {
                continue;
            };
            if pass.state.states[def.position].found {
                continue;
            }
            if matches!(def.validator, ValidatorKind::Regex { .. }) {
                pass.state.states[def.position].found = true;
            } else {
                let index = pass.state.positions[def.position].index();
                pass.dispatch(rule, index, &key);
            }
        }
    }

    /// Enforce presence of required fields and per-field cardinality limits.
    /// Fields promoted into category-child roles are keyed separately and
    /// excluded from the presence check.
    fn requirement_sweep(&self, pass: &Pass<'_>, report: &mut ValidationReport) {
        for def in self.schema.fields() {
            let state = pass.state.states[def.position];
            if !state.found && !self.schema.is_category_value(&def.name) {
                if state.optionality == Optionality::Required {
                    report.update_validity(false, &def.name, "required metadata tag is missing");
                }
            } else if let Some(max) = def.max_count
                && pass.state.positions[def.position].count > max as usize
            {
                report.update_validity(false, &def.name, "too many instances of the metadata tag");
            }
        }
    }

    // ─── Warning heuristics ─────────────────────────────────────────────────
    //
    // Best-effort advisories over the final rule state; they never affect
    // the validity flag.

    fn warning_pass(&self, rule: &Rule, pass: &Pass<'_>, report: &mut ValidationReport) {
        if let Some(org) = &self.organization_author {
            self.warn_author_missing(
                rule,
                pass,
                report,
                org,
                REPORT,
                format!("rule is authored by {} but no report is referenced", org),
            );
            self.warn_author_missing(
                rule,
                pass,
                report,
                org,
                HASH,
                format!("rule is authored by {} but no hash is referenced", org),
            );
        }
        self.warn_unresolved_actor(rule, pass, report);
    }

    /// Warn when the organization authored the rule but `sibling` is absent.
    fn warn_author_missing(
        &self,
        rule: &Rule,
        pass: &Pass<'_>,
        report: &mut ValidationReport,
        org: &str,
        sibling: &str,
        message: String,
    ) {
        let (Some(author), Some(target)) = (self.schema.get(AUTHOR), self.schema.get(sibling))
        else {
            return;
        };
        if !pass.state.states[author.position].found || pass.state.states[target.position].found {
            return;
        }
        for tag in rule.meta() {
            if let Some((key, value)) = tag.single()
                && key == AUTHOR
                && value.to_string().eq_ignore_ascii_case(org)
            {
                report.update_warning(sibling, message.clone());
            }
        }
    }

    /// Warn when an actor was named but its knowledge-base group was never
    /// resolved.
    fn warn_unresolved_actor(&self, rule: &Rule, pass: &Pass<'_>, report: &mut ValidationReport) {
        let Some(actor_def) = self
            .schema
            .fields()
            .find(|def| matches!(def.validator, ValidatorKind::Actor { .. }))
        else {
            return;
        };
        let ValidatorKind::Actor {
            child_placeholder, ..
        } = &actor_def.validator
        else {
            return;
        };
        let Some(placeholder) = self.schema.get(child_placeholder) else {
            return;
        };
        if !pass.state.states[actor_def.position].found
            || pass.state.states[placeholder.position].found
        {
            return;
        }
        for tag in rule.meta() {
            if let Some((key, value)) = tag.single()
                && key == actor_def.name
            {
                report.update_warning(
                    &actor_def.name,
                    format!(
                        "actor {} was not found in the threat intelligence knowledge base",
                        value
                    ),
                );
            }
        }
    }
}
