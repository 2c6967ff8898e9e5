//! # quiver-policy
//!
//! The validation layer: structural checks on SQL artifacts and on plugin
//! scripts, driven by policy rules.
//!
//! The separation matters: this crate decides *structural legality* (a
//! deny-list over surface patterns), while execution safety comes from the
//! executors' capability containment. Validation narrows the shape of what
//! the executors will accept; it does not claim to make arbitrary stored
//! code safe.

pub mod error;
pub mod rules;
pub mod script;
pub mod sql;

pub use error::PolicyError;
pub use rules::{PolicySet, PolicyRule, RuleAction, RuleCategory};
pub use script::validate_script;
pub use sql::{
    strip_comments, validate_ddl, validate_select, validate_select_template,
    validate_single_statement,
};
