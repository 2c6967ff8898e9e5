//! Error types for the artifact store.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A digest string did not match the `sha256:<hex>` format.
    #[error("invalid digest format: {0}")]
    InvalidDigest(String),

    /// An artifact kind column held an unknown value.
    #[error("unknown artifact kind: {0}")]
    UnknownKind(String),

    /// Database failure.
    #[error("artifact store database error: {0}")]
    Database(#[from] sqlx::Error),
}
