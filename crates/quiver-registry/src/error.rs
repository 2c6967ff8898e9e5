//! Error types for the registry.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// A record referenced an artifact digest that is not stored.
    #[error("registry record references unknown artifact digest {digest}")]
    DanglingDigest { digest: String },

    /// A resource record violated the static-xor-dynamic constraint.
    #[error("resource '{uri}' must have exactly one of static body or artifact digest")]
    ResourceShape { uri: String },

    /// A record column held malformed JSON.
    #[error("malformed JSON in column {column}: {reason}")]
    MalformedJson { column: String, reason: String },

    /// A stored enum column held an unknown value.
    #[error("unknown value '{value}' in column {column}")]
    UnknownValue { column: String, value: String },

    /// Underlying store failure.
    #[error(transparent)]
    Store(#[from] quiver_store::StoreError),

    /// Database failure.
    #[error("registry database error: {0}")]
    Database(#[from] sqlx::Error),
}
