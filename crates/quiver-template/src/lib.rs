//! # quiver-template
//!
//! Rendering for `select`-kind artifact bodies.
//!
//! Templates expand *structure*, never values: conditional blocks, loops,
//! and macro calls shape the SQL text, while every data value travels
//! through `:name` parameter binding downstream. The macro prelude, the
//! concatenation of all active macro records, is prepended to every body
//! before rendering, and rendered output is always re-validated before
//! execution (a macro could, in principle, expand to something that is no
//! longer a single read statement).
//!
//! Supported syntax, a deliberate subset of the common `{% %}` template
//! dialect:
//!
//! - `{% if arguments.x %}` / `{% elif … %}` / `{% else %}` / `{% endif %}`
//! - `{% for item in arguments.items %}` / `{% endfor %}`
//! - `{% macro name(a, b='default') %}` … `{% endmacro %}`
//! - `{{ expression }}`: dotted lookups, literals, and macro calls

pub mod error;
pub mod template;

pub use error::TemplateError;
pub use template::{is_macro_block, render, render_with_prelude};
