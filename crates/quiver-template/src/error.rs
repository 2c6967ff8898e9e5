//! Error types for template rendering.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateError {
    /// Malformed tag or expression syntax.
    #[error("template syntax error: {0}")]
    Syntax(String),

    /// A block tag was opened but never closed.
    #[error("unclosed '{0}' block")]
    UnclosedBlock(&'static str),

    /// A closing or continuation tag appeared without its opener.
    #[error("unexpected '{0}' tag")]
    UnexpectedTag(String),

    /// A macro call referenced an undefined macro.
    #[error("unknown macro '{0}'")]
    UnknownMacro(String),

    /// A macro was invoked with the wrong number of arguments.
    #[error("macro '{name}' expects {expected} arguments, got {got}")]
    MacroArity {
        name: String,
        expected: usize,
        got: usize,
    },
}
