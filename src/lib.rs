//! Schema-driven validation and canonicalization of YARA rule metadata.
//!
//! Given a structured rule — metadata tags, string definitions, condition
//! terms — plus its raw source text, this crate enforces a declarative
//! metadata standard and rewrites conforming rules into a deterministic
//! canonical form:
//!
//! ```text
//! parse(json) → Rule → Validator::validate(&mut rule, source) → ValidationReport
//!                          │ per-field dispatch, conditional requirements,
//!                          │ derived fields (id, fingerprint, version, dates),
//!                          │ knowledge-base cross-references,
//!                          └ canonical reorder + metadata-span splice
//! ```
//!
//! The field registry is compiled once from a YAML schema
//! ([`Schema::compile`], or [`Schema::builtin`] for the embedded default)
//! and the threat-intelligence knowledge base is injected as a trait object,
//! so the engine itself is a pure function of one rule plus that fixed
//! context. Everything outside the rule's `meta:` block — comments,
//! whitespace, strings, condition — is preserved byte-for-byte in the
//! canonical output.
//!
//! # Quick Start
//!
//! ```rust
//! use yaramd::{MemoryKnowledgeBase, Schema, Validator};
//!
//! let schema = Schema::builtin().expect("embedded schema compiles");
//! let kb = MemoryKnowledgeBase::default();
//! let validator = Validator::new(schema, Box::new(kb));
//!
//! let source = "rule demo\n{\n    meta:\n        author = \"analyst\"\n    condition:\n        true\n}";
//! let mut rule = yaramd::parse_rule(
//!     r#"{
//!         "rule_name": "demo",
//!         "metadata": [{"author": "analyst"}],
//!         "condition_terms": ["true"]
//!     }"#,
//! )
//! .expect("well-formed interchange JSON");
//!
//! let report = validator.validate(&mut rule, source);
//! assert!(!report.is_valid()); // several required tags are missing
//! for (field, message) in report.diagnostics() {
//!     println!("{}: {}", field, message);
//! }
//! ```

pub mod error;
pub mod fingerprint;
pub mod kb;
pub mod parse;
pub mod schema;
pub mod serialize;
pub mod types;
pub mod validate;

pub(crate) mod normalize;
pub(crate) mod state;
pub(crate) mod validators;

pub use error::{KbError, RuleParseError, SchemaError, ValidationReport};
pub use kb::{EntityKind, KnowledgeBase, MemoryKnowledgeBase, StixStore};
pub use schema::{FieldDef, FileSource, Optionality, Schema, ValidatorKind};
pub use types::{MetaTag, MetaValue, Rule, StringDef, StringKind};
pub use validate::Validator;

// Re-export entry-point functions at the crate root for convenience.
pub use fingerprint::fingerprint;
pub use parse::{parse_rule, parse_rules};
pub use serialize::render_rule;
