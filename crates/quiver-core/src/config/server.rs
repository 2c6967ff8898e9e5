//! Server transport and logging configuration.

use serde::{Deserialize, Serialize};

/// Transport for the MCP request stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Line-delimited JSON-RPC over standard streams.
    #[default]
    Stdio,
    /// Server-sent events over HTTP.
    Sse,
}

/// Server settings: transport, bind address, logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Transport type.
    #[serde(default)]
    pub transport: Transport,

    /// Bind host (SSE transport only).
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port (SSE transport only).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level filter (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory for log files. When unset, logs go to stderr only.
    #[serde(default)]
    pub logs_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            logs_dir: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}
