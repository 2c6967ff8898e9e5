//! Error types for validation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// The statement is not read-only: either its first significant token
    /// is not a read, or a forbidden keyword appears as a significant
    /// token.
    #[error("statement is not a read-only SELECT (keyword '{keyword}')")]
    NotReadOnly { keyword: String },

    /// More than one statement was supplied.
    #[error("multiple SQL statements detected; only single statements are allowed")]
    MultipleStatements,

    /// Nothing but whitespace and comments.
    #[error("empty SQL statement")]
    EmptyStatement,

    /// DDL mode: the first token is not a DDL verb.
    #[error("not a DDL statement; must begin with CREATE, ALTER, DROP, or TRUNCATE")]
    NotDdl,

    /// A script matched an active policy rule.
    #[error("policy violation: {category} '{name}' denied by pattern '{pattern}' (line {line})")]
    Violation {
        category: &'static str,
        pattern: String,
        name: String,
        line: usize,
    },
}
