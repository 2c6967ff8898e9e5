//! Manual meta-tools: update, inspect, and verify tool documentation.
//!
//! An auto-created tool moves CREATED → VERIFIED when every manual example
//! passes a verification run; any change to its examples or artifact
//! resets the verified flags.

use async_trait::async_trait;
use serde_json::{json, Value};

use quiver_core::Persona;
use quiver_registry::ToolManual;

use super::{optional_str, required_str, Builtin};
use crate::dispatcher::{render_summary, CallContext, Dispatcher};
use crate::error::DispatchError;

/// `system_update_manual`: merge or replace a tool's manual.
pub struct UpdateManual;

#[async_trait]
impl Builtin for UpdateManual {
    fn name(&self) -> &'static str {
        "system_update_manual"
    }

    fn description(&self) -> &'static str {
        "Update a tool's manual (usage guide, examples, pitfalls) in merge or replace mode"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Tool whose manual to update"},
                "persona": {"type": "string", "description": "Tool persona (default: 'default')"},
                "mode": {"type": "string", "enum": ["merge", "replace"], "description": "merge appends arrays; replace overwrites the manual"},
                "manual": {"type": "object", "description": "Manual fields: usage_guide, examples, pitfalls, error_codes"}
            },
            "required": ["tool_name", "manual"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let tool_name = required_str(arguments, "tool_name")?;
        let persona = Persona::new(optional_str(arguments, "persona", "default"));
        let mode = optional_str(arguments, "mode", "merge");

        let incoming: ToolManual = arguments
            .get("manual")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DispatchError::InvalidInput(format!("bad manual: {e}")))?
            .unwrap_or_default();

        let record = dispatcher
            .state()
            .registry()
            .get_tool(tool_name, &persona)
            .await?
            .ok_or_else(|| DispatchError::ToolNotFound {
                name: tool_name.to_string(),
                persona: persona.to_string(),
            })?;

        let mut manual = match (mode, record.manual) {
            ("replace", _) | ("merge", None) => incoming,
            ("merge", Some(mut existing)) => {
                if !incoming.usage_guide.is_empty() {
                    existing.usage_guide = incoming.usage_guide;
                }
                existing.examples.extend(incoming.examples);
                existing.pitfalls.extend(incoming.pitfalls);
                existing.error_codes.extend(incoming.error_codes);
                existing
            }
            (other, _) => {
                return Err(DispatchError::InvalidInput(format!(
                    "mode must be 'merge' or 'replace', got '{other}'"
                )))
            }
        };

        // Any manual change invalidates prior verification.
        for example in &mut manual.examples {
            example.verified = false;
        }

        dispatcher
            .state()
            .registry()
            .update_tool_manual(tool_name, &persona, Some(&manual))
            .await?;

        Ok(json!(format!(
            "Manual for '{}' updated ({} mode). {} example(s) pending verification.",
            tool_name,
            mode,
            manual.examples.len()
        )))
    }
}

/// `system_inspect_tool`: read-only view of a tool record and its manual.
pub struct InspectTool;

#[async_trait]
impl Builtin for InspectTool {
    fn name(&self) -> &'static str {
        "system_inspect_tool"
    }

    fn description(&self) -> &'static str {
        "Inspect a tool's registration, input schema, and manual"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Tool to inspect"},
                "persona": {"type": "string", "description": "Tool persona (default: 'default')"}
            },
            "required": ["tool_name"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let tool_name = required_str(arguments, "tool_name")?;
        let persona = Persona::new(optional_str(arguments, "persona", "default"));

        let record = dispatcher
            .state()
            .registry()
            .get_tool(tool_name, &persona)
            .await?
            .ok_or_else(|| DispatchError::ToolNotFound {
                name: tool_name.to_string(),
                persona: persona.to_string(),
            })?;

        Ok(json!({
            "name": record.name,
            "persona": record.persona.as_str(),
            "description": record.description,
            "group": record.group,
            "is_auto_created": record.is_auto_created,
            "artifact_digest": record.artifact_digest.as_str(),
            "input_schema": record.input_schema,
            "manual": record.manual,
        }))
    }
}

/// `system_verify_tool`: run every manual example through the dispatcher
/// and update its verified flag.
pub struct VerifyTool;

#[async_trait]
impl Builtin for VerifyTool {
    fn name(&self) -> &'static str {
        "system_verify_tool"
    }

    fn description(&self) -> &'static str {
        "Run the examples in a tool's manual and mark which ones pass"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Tool to verify"},
                "persona": {"type": "string", "description": "Tool persona (default: 'default')"}
            },
            "required": ["tool_name"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let tool_name = required_str(arguments, "tool_name")?;
        let persona = Persona::new(optional_str(arguments, "persona", "default"));

        let record = dispatcher
            .state()
            .registry()
            .get_tool(tool_name, &persona)
            .await?
            .ok_or_else(|| DispatchError::ToolNotFound {
                name: tool_name.to_string(),
                persona: persona.to_string(),
            })?;

        let Some(mut manual) = record.manual else {
            return Ok(json!(format!(
                "No manual found for '{}'; nothing to verify",
                tool_name
            )));
        };
        if manual.examples.is_empty() {
            return Ok(json!(format!(
                "No examples in the manual for '{}'; nothing to verify",
                tool_name
            )));
        }

        let mut passed = 0;
        let mut reports = Vec::new();
        for (index, example) in manual.examples.iter_mut().enumerate() {
            let outcome = dispatcher
                .call_tool_at_depth(
                    tool_name,
                    &persona,
                    example.input.clone(),
                    ctx.depth + 1,
                )
                .await;
            let (ok, detail) = match outcome {
                Ok(result) => {
                    let rendered = render_summary(&result);
                    match &example.expect {
                        Some(expected) if !rendered.contains(expected.as_str()) => (
                            false,
                            format!("expected '{}' in result, got: {}", expected, rendered),
                        ),
                        _ => (true, rendered),
                    }
                }
                Err(e) => (false, e.to_string()),
            };
            example.verified = ok;
            if ok {
                passed += 1;
            }
            reports.push(json!({
                "example": index + 1,
                "verified": ok,
                "detail": detail,
            }));
        }

        let total = manual.examples.len();
        dispatcher
            .state()
            .registry()
            .update_tool_manual(tool_name, &persona, Some(&manual))
            .await?;

        Ok(json!({
            "tool": tool_name,
            "passed": passed,
            "total": total,
            "verified": passed == total,
            "results": reports,
        }))
    }
}
