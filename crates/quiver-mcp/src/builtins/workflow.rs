//! The `execute_workflow` meta-tool: the chain engine's tool surface.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::Builtin;
use crate::chain::{execute_chain, Step};
use crate::dispatcher::{CallContext, Dispatcher};
use crate::error::DispatchError;

pub struct ExecuteWorkflow;

#[async_trait]
impl Builtin for ExecuteWorkflow {
    fn name(&self) -> &'static str {
        "execute_workflow"
    }

    fn description(&self) -> &'static str {
        "Execute a chain of tool calls with ${step_id.path} substitution between steps"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "steps": {
                    "type": "array",
                    "description": "Steps executed in order; args may reference earlier results via ${id} or ${id.path}",
                    "items": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string", "description": "Unique step id for references"},
                            "tool": {"type": "string", "description": "Tool to call"},
                            "args": {"type": "object", "description": "Arguments, with ${id.path} substitution"}
                        },
                        "required": ["id", "tool", "args"]
                    }
                }
            },
            "required": ["steps"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let steps: Vec<Step> = arguments
            .get("steps")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DispatchError::InvalidInput(format!("bad steps list: {e}")))?
            .unwrap_or_default();
        if steps.is_empty() {
            return Err(DispatchError::InvalidInput(
                "steps must be a non-empty list".to_string(),
            ));
        }
        execute_chain(dispatcher, &ctx.persona, ctx.depth, steps).await
    }
}
