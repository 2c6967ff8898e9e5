//! # quiver-registry
//!
//! The registry: typed tables describing tools, resources, prompts, macros,
//! icons, and security policies. Records reference artifacts by digest;
//! artifacts themselves live in `quiver-store` and are shared (several
//! records may point at one digest).
//!
//! Alongside the persistent tables, the registry owns the process-local
//! temporary registries for test tools and resources. Temporary entries
//! follow the same invariants as persistent ones but never touch the
//! database and die with the process.

pub mod error;
pub mod records;
pub mod registry;
pub mod temp;

pub use error::RegistryError;
pub use records::{
    IconFormat, IconRecord, MacroRecord, ManualExample, PolicyCategory, PolicyRuleType,
    PromptArgument, PromptRecord, ResourceRecord, SecurityPolicyRecord, ToolManual, ToolRecord,
};
pub use registry::Registry;
pub use temp::{TempArtifact, TempRegistry, TempResource, TempTool};
