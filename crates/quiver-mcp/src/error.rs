//! Dispatch error kinds.
//!
//! The dispatcher is the single point where a failure becomes an audit
//! entry, a self-correction note, and an error re-raised to the caller.
//! Nothing below it recovers errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// No registry row matched `(name, persona)`.
    #[error("tool '{name}' not found for persona '{persona}'")]
    ToolNotFound { name: String, persona: String },

    /// No resource row matched `(uri, persona)`.
    #[error("resource '{uri}' not found for persona '{persona}'")]
    ResourceNotFound { uri: String, persona: String },

    /// No prompt row matched `(name, persona)`.
    #[error("prompt '{name}' not found for persona '{persona}'")]
    PromptNotFound { name: String, persona: String },

    /// The record's digest is not present in the artifact store.
    #[error("artifact {digest} referenced by '{name}' is missing from the store")]
    ArtifactMissing { name: String, digest: String },

    /// The stored body no longer hashes to its digest.
    #[error("artifact {digest} is corrupt: stored body does not match its digest")]
    ArtifactCorrupt { digest: String },

    /// A required prompt placeholder was absent from the arguments.
    #[error("missing required argument '{name}'")]
    MissingArgument { name: String },

    /// The data session is not available (offline mode).
    #[error("data backend unavailable; use 'reconnect_db' to try again")]
    DataBackendUnavailable,

    /// A `:name` placeholder had no matching argument at bind time.
    #[error("no argument supplied for placeholder ':{name}'")]
    UnboundPlaceholder { name: String },

    /// Sub-executor recursion ran too deep.
    #[error("sub-executor recursion limit exceeded at depth {depth}")]
    RecursionLimit { depth: u32 },

    /// Meta-tool input failed its own validation.
    #[error("invalid meta-tool input: {0}")]
    InvalidInput(String),

    /// The dashboard feature is disabled by configuration.
    #[error("dashboard feature is disabled")]
    DashboardDisabled,

    /// The dispatched call was cancelled.
    #[error("cancelled")]
    Cancelled,

    /// SQL or policy validation failed.
    #[error(transparent)]
    Policy(#[from] quiver_policy::PolicyError),

    /// Script parse, discovery, or runtime failure.
    #[error(transparent)]
    Script(#[from] quiver_script::ScriptError),

    /// Template rendering failure.
    #[error(transparent)]
    Template(#[from] quiver_template::TemplateError),

    /// Registry failure.
    #[error(transparent)]
    Registry(#[from] quiver_registry::RegistryError),

    /// Artifact store failure.
    #[error(transparent)]
    Store(#[from] quiver_store::StoreError),

    /// Audit storage failure.
    #[error(transparent)]
    Audit(#[from] quiver_audit::AuditError),

    /// Chain engine failure.
    #[error(transparent)]
    Chain(#[from] crate::chain::ChainError),

    /// Data store execution failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl DispatchError {
    /// Diagnostic text stored as the audit traceback: the full error chain,
    /// outermost first.
    pub fn traceback(&self) -> String {
        let mut lines = vec![self.to_string()];
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            lines.push(format!("caused by: {}", cause));
            source = cause.source();
        }
        lines.join("\n")
    }
}
