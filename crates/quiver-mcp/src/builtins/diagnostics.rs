//! Diagnostic meta-tools: last-error lookup, data-session lifecycle, and
//! the agent notebook.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{required_str, Builtin};
use crate::dispatcher::{CallContext, Dispatcher};
use crate::error::DispatchError;

/// `get_last_error`: the most recent FAILURE entry, formatted with its
/// arguments, persona, timestamp, and full traceback.
pub struct GetLastError;

#[async_trait]
impl Builtin for GetLastError {
    fn name(&self) -> &'static str {
        "get_last_error"
    }

    fn description(&self) -> &'static str {
        "Fetch the most recent execution failure, optionally filtered by tool name"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Only failures of this tool"}
            }
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let tool_name = arguments.get("tool_name").and_then(|v| v.as_str());
        let entry = dispatcher.state().recorder().last_failure(tool_name).await?;

        let Some(entry) = entry else {
            return Ok(json!(match tool_name {
                Some(name) => format!("No errors found for tool '{}'", name),
                None => "No errors found in execution log".to_string(),
            }));
        };

        let mut lines = Vec::new();
        lines.push(format!("Last error for tool '{}':", entry.tool_name));
        lines.push(format!("Time: {}", entry.timestamp.to_rfc3339()));
        lines.push(format!("Persona: {}", entry.persona));
        lines.push(format!("Input: {}", entry.arguments));
        lines.push(String::new());
        lines.push("Traceback:".to_string());
        lines.push(
            entry
                .error_traceback
                .unwrap_or_else(|| "No traceback available".to_string()),
        );
        Ok(json!(lines.join("\n")))
    }
}

/// `reconnect_db`: re-open the data session from configuration.
pub struct ReconnectDb;

#[async_trait]
impl Builtin for ReconnectDb {
    fn name(&self) -> &'static str {
        "reconnect_db"
    }

    fn description(&self) -> &'static str {
        "Reconnect the data database after an outage"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        _arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let online = dispatcher.state().reconnect_data().await?;
        Ok(json!(if online {
            "Data database reconnected; SQL tools are available again"
        } else {
            "Data database is still unavailable; the server remains offline"
        }))
    }
}

/// `test_db_connection`: probe the data session.
pub struct TestDbConnection;

#[async_trait]
impl Builtin for TestDbConnection {
    fn name(&self) -> &'static str {
        "test_db_connection"
    }

    fn description(&self) -> &'static str {
        "Check whether the data database is reachable"
    }

    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        _arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let alive = dispatcher.state().data_session_alive().await;
        Ok(json!(if alive {
            "Data database connection is healthy"
        } else {
            "Data database is unavailable (offline mode); try 'reconnect_db'"
        }))
    }
}

/// `system_notebook`: the agent's long-term key/value memory.
pub struct NotebookTool;

#[async_trait]
impl Builtin for NotebookTool {
    fn name(&self) -> &'static str {
        "system_notebook"
    }

    fn description(&self) -> &'static str {
        "Read and write the agent notebook (get/set/list/delete by domain and key)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {"type": "string", "enum": ["get", "set", "list", "delete"], "description": "Operation to perform"},
                "domain": {"type": "string", "description": "Memory domain (e.g. 'user_prefs')"},
                "key": {"type": "string", "description": "Key within the domain"},
                "value": {"type": "string", "description": "Value to store (set only)"}
            },
            "required": ["action", "domain"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let action = required_str(arguments, "action")?;
        let domain = required_str(arguments, "domain")?;
        let notebook = dispatcher.state().notebook();
        let updated_by = ctx.tool_name.as_str();

        match action {
            "get" => {
                let key = required_str(arguments, "key")?;
                match notebook.get(domain, key).await? {
                    Some(entry) => Ok(json!({
                        "domain": entry.domain,
                        "key": entry.key,
                        "value": entry.value,
                        "updated_at": entry.updated_at.to_rfc3339(),
                        "updated_by": entry.updated_by,
                    })),
                    None => Ok(json!(format!("No entry for {}/{}", domain, key))),
                }
            }
            "set" => {
                let key = required_str(arguments, "key")?;
                let value = required_str(arguments, "value")?;
                notebook.set(domain, key, value, updated_by).await?;
                Ok(json!(format!("Stored {}/{}", domain, key)))
            }
            "list" => {
                let entries = notebook.list(domain).await?;
                Ok(json!(entries
                    .into_iter()
                    .map(|e| json!({"key": e.key, "value": e.value}))
                    .collect::<Vec<_>>()))
            }
            "delete" => {
                let key = required_str(arguments, "key")?;
                let removed = notebook.delete(domain, key, updated_by).await?;
                Ok(json!(if removed {
                    format!("Deleted {}/{}", domain, key)
                } else {
                    format!("No entry for {}/{}", domain, key)
                }))
            }
            other => Err(DispatchError::InvalidInput(format!(
                "action must be get/set/list/delete, got '{other}'"
            ))),
        }
    }
}
