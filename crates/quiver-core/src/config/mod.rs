//! Configuration types for the Quiver MCP server.
//!
//! The configuration tree covers the server transport, the two database
//! connections (metadata is required, data is optional), the dashboard
//! feature toggle, and the registry table-name mapping. Unknown keys are a
//! startup error: every struct here carries `deny_unknown_fields` so a typo
//! in a config file fails loudly instead of being silently ignored.

pub mod dashboard;
pub mod database;
pub mod server;
pub mod tables;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use dashboard::DashboardConfig;
pub use database::DatabaseConfig;
pub use server::{ServerConfig, Transport};
pub use tables::TableNames;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The metadata database URL is missing.
    #[error("metadata database URL is required (set databases.metadata_url)")]
    MissingMetadataUrl,

    /// The configuration document failed to parse.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Complete Quiver configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct QuiverConfig {
    /// Server transport and logging settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database connections (metadata required, data optional).
    #[serde(default)]
    pub databases: DatabaseConfig,

    /// Dashboard feature settings.
    #[serde(default)]
    pub dashboard: DashboardConfig,

    /// Registry table-name overrides and optional schema prefix.
    #[serde(default)]
    pub tables: TableNames,
}

impl QuiverConfig {
    /// Parse a configuration document from JSON text.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|e| ConfigError::Invalid(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.databases.metadata_url.is_empty() {
            return Err(ConfigError::MissingMetadataUrl);
        }
        Ok(())
    }
}
