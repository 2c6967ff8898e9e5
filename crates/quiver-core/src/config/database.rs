//! Database connection configuration.
//!
//! Quiver runs against two databases. The metadata database holds the
//! registry, artifact store, audit log, and notebook; opening it is fatal on
//! failure. The data database holds user data queried by `select`-kind
//! tools; it is optional, and its absence puts the server into offline mode.

use serde::{Deserialize, Serialize};

/// The two connection strings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Metadata database URL (required). `sqlite:` and `postgres:` schemes
    /// are supported.
    #[serde(default)]
    pub metadata_url: String,

    /// Data database URL (optional). When absent, `select`-kind dispatches
    /// fail with a recoverable offline error.
    #[serde(default)]
    pub data_url: Option<String>,
}

/// SQL dialect derived from a connection URL scheme.
///
/// The merge meta-tool emits dialect-specific upsert SQL; everything else
/// only needs to know which bind-placeholder style the driver expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Sqlite,
    Postgres,
    /// Anything else: standard SQL, `MERGE` upserts, `?` placeholders.
    Standard,
}

impl Dialect {
    /// Infer the dialect from a connection URL.
    pub fn from_url(url: &str) -> Self {
        let scheme = url.split(':').next().unwrap_or("").to_ascii_lowercase();
        match scheme.as_str() {
            "sqlite" => Dialect::Sqlite,
            "postgres" | "postgresql" => Dialect::Postgres,
            _ => Dialect::Standard,
        }
    }

    /// Whether the driver uses `$N` numbered placeholders.
    pub fn uses_numbered_placeholders(&self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialect_inference() {
        assert_eq!(Dialect::from_url("sqlite::memory:"), Dialect::Sqlite);
        assert_eq!(
            Dialect::from_url("postgres://u:p@localhost/db"),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("postgresql://u:p@localhost/db"),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("mysql://h/db"), Dialect::Standard);
    }
}
