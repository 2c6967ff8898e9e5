//! # quiver-mcp
//!
//! The MCP server core: a dynamic dispatcher over a database-backed
//! registry.
//!
//! Clients issue MCP requests (`tools/list`, `tools/call`,
//! `resources/read`, `prompts/get`, …); the dispatcher resolves each
//! against the temporary and persistent registries, fetches the referenced
//! artifact, verifies its integrity, validates it, executes it (SQL
//! against the data session or a plugin script under a controlled
//! capability set), and records the outcome in the execution log. The
//! self-modifying surface (meta-tools that write new registry rows) and
//! the workflow chain engine live here too.
//!
//! ```text
//! MCP client
//!     │ tools/call {name, arguments}
//!     ▼
//! ┌──────────────────────────────┐
//! │ Dispatcher                   │
//! │ 1. resolve (name, persona)   │ ← temp registry, then tables
//! │ 2. load + re-hash artifact   │ ← quiver-store
//! │ 3. validate                  │ ← quiver-policy
//! │ 4. route by kind             │
//! │    select → SQL executor     │ ← render, bind :name, execute
//! │    script → interpreter      │ ← quiver-script + capabilities
//! │    ui     → runner URL       │
//! │ 5. audit + self-correction   │ ← quiver-audit
//! └──────────────────────────────┘
//! ```

pub mod builtins;
pub mod chain;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod script_exec;
pub mod seed;
pub mod server;
pub mod sql_exec;
pub mod state;
pub mod toon;
pub mod transport;

pub use dispatcher::{CallContext, Dispatcher, ResourceContent};
pub use error::DispatchError;
pub use server::McpServer;
pub use state::{ServerState, StartupError};
