//! Error types for the script language.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    /// The source failed to lex or parse, or a disallowed construct
    /// appeared at the top level.
    #[error("invalid script structure at line {line}: {message}")]
    InvalidStructure { line: usize, message: String },

    /// No class extending `Tool` was found in the script.
    #[error("no class extending Tool found in script")]
    NoToolClass,

    /// More than one class extending `Tool` was found.
    #[error("ambiguous script: {count} classes extend Tool, expected exactly one")]
    AmbiguousToolClass { count: usize },

    /// The located tool class has no `run` method.
    #[error("tool class '{class}' has no run method")]
    MissingRunMethod { class: String },

    /// A runtime failure inside script evaluation.
    #[error("script runtime error at line {line}: {message}")]
    Runtime { line: usize, message: String },

    /// The script exceeded its evaluation budget.
    #[error("script exceeded its evaluation budget ({steps} steps)")]
    BudgetExhausted { steps: u64 },

    /// A capability call into the host failed.
    #[error("host capability error: {0}")]
    Host(String),
}

impl ScriptError {
    pub(crate) fn runtime(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Runtime {
            line,
            message: message.into(),
        }
    }
}
