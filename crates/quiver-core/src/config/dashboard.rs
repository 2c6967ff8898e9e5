//! Dashboard feature configuration.
//!
//! Dashboards are `ui`-kind artifacts served by an external runner process.
//! The core only stores the artifact, writes its body to the storage
//! directory, and hands back a URL; the runner is out of scope.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DashboardConfig {
    /// Whether the `create_dashboard` meta-tool is available.
    #[serde(default)]
    pub enabled: bool,

    /// Directory where dashboard bodies are written (named after the tool).
    #[serde(default = "default_storage_dir")]
    pub storage_dir: String,

    /// Base URL of the external dashboard runner.
    #[serde(default = "default_runner_url")]
    pub runner_url: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            storage_dir: default_storage_dir(),
            runner_url: default_runner_url(),
        }
    }
}

fn default_storage_dir() -> String {
    "ui_apps".to_string()
}

fn default_runner_url() -> String {
    "http://localhost:8501".to_string()
}
