//! End-to-end tests over in-memory SQLite databases.
//!
//! Test modules are organized by feature area:
//! - `greet` - the seeded starter tool and audit completeness
//! - `sql_tools` - SQL tool creation, parameterized dispatch, limits
//! - `self_heal` - failure capture, get_last_error, self-correction notes
//! - `chain_flows` - workflow DAG validation and substitution
//! - `meta_tools` - prompts, resources, macros, manuals, merge/DDL
//! - `offline` - behavior without a data session
//!
//! Run with:
//!   cargo test -p quiver-mcp --test e2e

// Test modules (located in the e2e/ subdirectory)
#[path = "e2e/common/mod.rs"]
mod common;

#[path = "e2e/greet.rs"]
mod greet;

#[path = "e2e/sql_tools.rs"]
mod sql_tools;

#[path = "e2e/self_heal.rs"]
mod self_heal;

#[path = "e2e/chain_flows.rs"]
mod chain_flows;

#[path = "e2e/meta_tools.rs"]
mod meta_tools;

#[path = "e2e/offline.rs"]
mod offline;
