//! Registry table-name mapping.
//!
//! Enterprise deployments rename registry tables or push them into a
//! dedicated schema. Every SQL statement the registry, store, and audit
//! crates emit goes through this mapping instead of hardcoding names.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableNames {
    /// Optional schema prefix applied to every table (e.g. `quiver`).
    #[serde(default)]
    pub schema: Option<String>,

    #[serde(default = "default_artifacts")]
    pub artifacts: String,
    #[serde(default = "default_tools")]
    pub tools: String,
    #[serde(default = "default_resources")]
    pub resources: String,
    #[serde(default = "default_prompts")]
    pub prompts: String,
    #[serde(default = "default_macros")]
    pub macros: String,
    #[serde(default = "default_icons")]
    pub icons: String,
    #[serde(default = "default_security_policies")]
    pub security_policies: String,
    #[serde(default = "default_execution_log")]
    pub execution_log: String,
    #[serde(default = "default_notebook")]
    pub notebook: String,
    #[serde(default = "default_notebook_history")]
    pub notebook_history: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            schema: None,
            artifacts: default_artifacts(),
            tools: default_tools(),
            resources: default_resources(),
            prompts: default_prompts(),
            macros: default_macros(),
            icons: default_icons(),
            security_policies: default_security_policies(),
            execution_log: default_execution_log(),
            notebook: default_notebook(),
            notebook_history: default_notebook_history(),
        }
    }
}

impl TableNames {
    /// Qualify a table name with the schema prefix when one is configured.
    pub fn qualified(&self, table: &str) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, table),
            None => table.to_string(),
        }
    }
}

fn default_artifacts() -> String {
    "artifacts".to_string()
}
fn default_tools() -> String {
    "tools".to_string()
}
fn default_resources() -> String {
    "resources".to_string()
}
fn default_prompts() -> String {
    "prompts".to_string()
}
fn default_macros() -> String {
    "macros".to_string()
}
fn default_icons() -> String {
    "icons".to_string()
}
fn default_security_policies() -> String {
    "security_policies".to_string()
}
fn default_execution_log() -> String {
    "execution_log".to_string()
}
fn default_notebook() -> String {
    "notebook".to_string()
}
fn default_notebook_history() -> String {
    "notebook_history".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_prefix_is_applied() {
        let mut names = TableNames::default();
        assert_eq!(names.qualified(&names.tools), "tools");
        names.schema = Some("quiver".to_string());
        assert_eq!(names.qualified(&names.tools), "quiver.tools");
    }
}
