//! # quiver-core
//!
//! Shared configuration and core types for the Quiver MCP server.
//!
//! Quiver is an MCP server whose tool, resource, and prompt catalog lives in
//! a metadata database rather than in source files. This crate holds the
//! pieces every other crate needs: the configuration tree, the persona type,
//! and the table-name mapping used by enterprise deployments that rename or
//! schema-prefix the registry tables.

pub mod config;
pub mod persona;
pub mod sql;

pub use config::database::Dialect;
pub use config::{
    ConfigError, DashboardConfig, DatabaseConfig, QuiverConfig, ServerConfig, TableNames,
    Transport,
};
pub use persona::Persona;
