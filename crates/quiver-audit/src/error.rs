//! Error types for the audit crate.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuditError {
    /// A stored status column held an unknown value.
    #[error("unknown execution status: {0}")]
    UnknownStatus(String),

    /// Database failure.
    #[error("audit database error: {0}")]
    Database(#[from] sqlx::Error),
}
