//! Built-in meta-tools: the self-modifying surface.
//!
//! Meta-tools are ordinary registry rows in the `system` group whose
//! dispatch resolves to native implementations. Their artifact rows hold
//! canonical stub scripts so integrity checks and listings treat them like
//! any other tool; the stub bodies never execute.
//!
//! Being ordinary tools, meta-tools participate fully in the audit policy:
//! their validation failures land in the execution log and the
//! self-correction notebook like anyone else's.

mod creators;
mod data_tools;
mod diagnostics;
mod icons;
mod manual;
mod workflow;

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::dispatcher::{CallContext, Dispatcher};
use crate::error::DispatchError;

/// One built-in meta-tool.
#[async_trait]
pub trait Builtin: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn input_schema(&self) -> Value;

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError>;
}

/// The standard set, keyed by tool name.
pub struct Builtins {
    tools: HashMap<&'static str, Box<dyn Builtin>>,
}

impl Builtins {
    pub fn standard() -> Self {
        let all: Vec<Box<dyn Builtin>> = vec![
            Box::new(creators::CreateSqlTool),
            Box::new(creators::CreatePrompt),
            Box::new(creators::CreateResource),
            Box::new(creators::CreateTempTool),
            Box::new(creators::CreateTempResource),
            Box::new(creators::RegisterMacro),
            Box::new(creators::CreateDashboard),
            Box::new(manual::UpdateManual),
            Box::new(manual::InspectTool),
            Box::new(manual::VerifyTool),
            Box::new(diagnostics::GetLastError),
            Box::new(diagnostics::ReconnectDb),
            Box::new(diagnostics::TestDbConnection),
            Box::new(diagnostics::NotebookTool),
            Box::new(icons::RegisterIcon),
            Box::new(icons::ListIcons),
            Box::new(data_tools::MergeTool),
            Box::new(data_tools::DdlTool),
            Box::new(workflow::ExecuteWorkflow),
        ];
        let mut tools = HashMap::new();
        for tool in all {
            tools.insert(tool.name(), tool);
        }
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Builtin> {
        self.tools.get(name).map(|b| b.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Builtin> {
        self.tools.values().map(|b| b.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }
}

/// Pull a required string field out of a meta-tool argument bag.
pub(crate) fn required_str<'a>(
    arguments: &'a Value,
    field: &str,
) -> Result<&'a str, DispatchError> {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| DispatchError::InvalidInput(format!("{} is required", field)))
}

/// Optional string field with a default.
pub(crate) fn optional_str<'a>(arguments: &'a Value, field: &str, default: &'a str) -> &'a str {
    arguments
        .get(field)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

/// Synthesize a JSON-Schema object from a `parameters` map of
/// `{name: {type, description, required}}`.
pub(crate) fn schema_from_parameters(parameters: &Value) -> Value {
    let mut properties = serde_json::Map::new();
    let mut required = Vec::new();
    if let Some(entries) = parameters.as_object() {
        for (name, spec) in entries {
            let param_type = spec.get("type").and_then(|v| v.as_str()).unwrap_or("string");
            let description = spec
                .get("description")
                .and_then(|v| v.as_str())
                .unwrap_or("");
            properties.insert(
                name.clone(),
                serde_json::json!({"type": param_type, "description": description}),
            );
            if spec.get("required").and_then(|v| v.as_bool()).unwrap_or(false) {
                required.push(Value::String(name.clone()));
            }
        }
    }
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
