//! Creator meta-tools: new SQL tools, prompts, resources, macros,
//! dashboards, and their temporary variants.

use async_trait::async_trait;
use serde_json::{json, Value};

use quiver_core::Persona;
use quiver_policy::validate_select_template;
use quiver_registry::{
    MacroRecord, PromptArgument, PromptRecord, ResourceRecord, TempResource, TempTool, ToolRecord,
};
use quiver_store::{ArtifactKind, Digest};
use quiver_template::is_macro_block;

use super::{optional_str, required_str, schema_from_parameters, Builtin};
use crate::dispatcher::{CallContext, Dispatcher};
use crate::error::DispatchError;

/// `create_new_sql_tool`: registers a persistent SELECT template tool.
pub struct CreateSqlTool;

#[async_trait]
impl Builtin for CreateSqlTool {
    fn name(&self) -> &'static str {
        "create_new_sql_tool"
    }

    fn description(&self) -> &'static str {
        "Create or update a SQL tool from a SELECT template with :name parameters"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Name of the tool to create"},
                "description": {"type": "string", "description": "What the tool does"},
                "sql_query": {"type": "string", "description": "SELECT template; values use :name placeholders, structure may use {% if %} blocks"},
                "parameters": {"type": "object", "description": "Map of parameter name to {type, description, required}"}
            },
            "required": ["tool_name", "description", "sql_query"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let tool_name = required_str(arguments, "tool_name")?;
        let description = required_str(arguments, "description")?;
        let sql_query = required_str(arguments, "sql_query")?;
        let parameters = arguments.get("parameters").cloned().unwrap_or(json!({}));

        // Relaxed pre-check on the body as written; the full check runs on
        // every rendered dispatch.
        validate_select_template(sql_query)?;

        // Re-pointing a tool at a new artifact keeps its manual but
        // invalidates prior verification.
        let persona = Persona::default();
        let manual = match dispatcher
            .state()
            .registry()
            .get_tool(tool_name, &persona)
            .await?
        {
            Some(existing) => existing.manual.map(|mut manual| {
                for example in &mut manual.examples {
                    example.verified = false;
                }
                manual
            }),
            None => None,
        };

        let record = ToolRecord {
            name: tool_name.to_string(),
            persona,
            description: description.to_string(),
            input_schema: schema_from_parameters(&parameters),
            artifact_digest: Digest::of(sql_query),
            is_auto_created: true,
            group: "general".to_string(),
            manual,
        };
        dispatcher
            .state()
            .registry()
            .upsert_tool_with_artifact(&record, sql_query, ArtifactKind::Select)
            .await?;

        let names: Vec<&str> = parameters
            .as_object()
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        Ok(json!(format!(
            "Tool '{}' registered and ready to use. Parameters: {:?}",
            tool_name, names
        )))
    }
}

/// `create_new_prompt`: registers or updates a prompt template.
pub struct CreatePrompt;

#[async_trait]
impl Builtin for CreatePrompt {
    fn name(&self) -> &'static str {
        "create_new_prompt"
    }

    fn description(&self) -> &'static str {
        "Create or update a prompt template with {name} placeholders"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Prompt name"},
                "description": {"type": "string", "description": "What the prompt does"},
                "template": {"type": "string", "description": "Template text with {name} placeholders"},
                "arguments": {"type": "array", "description": "Argument definitions: [{name, description, required}]"},
                "persona": {"type": "string", "description": "Target persona (default: 'default')"}
            },
            "required": ["name", "description", "template"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let name = required_str(arguments, "name")?;
        let description = required_str(arguments, "description")?;
        let template = required_str(arguments, "template")?;
        let persona = Persona::new(optional_str(arguments, "persona", "default"));

        let argument_defs: Vec<PromptArgument> = arguments
            .get("arguments")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| DispatchError::InvalidInput(format!("bad arguments list: {e}")))?
            .unwrap_or_default();

        let record = PromptRecord {
            name: name.to_string(),
            persona: persona.clone(),
            description: description.to_string(),
            template: template.to_string(),
            arguments: argument_defs.clone(),
            group: "general".to_string(),
        };
        dispatcher.state().registry().upsert_prompt(&record).await?;

        let names: Vec<&str> = argument_defs.iter().map(|a| a.name.as_str()).collect();
        Ok(json!(format!(
            "Prompt '{}' registered for persona '{}'. Arguments: {:?}",
            name, persona, names
        )))
    }
}

/// `create_new_resource`: registers a static resource. Dynamic resources
/// are reserved for spec-load paths.
pub struct CreateResource;

#[async_trait]
impl Builtin for CreateResource {
    fn name(&self) -> &'static str {
        "create_new_resource"
    }

    fn description(&self) -> &'static str {
        "Create or update a static resource"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "uri": {"type": "string", "description": "Resource URI (e.g. 'memo://project_notes')"},
                "name": {"type": "string", "description": "Human-readable name"},
                "description": {"type": "string", "description": "What the resource holds"},
                "content": {"type": "string", "description": "Static text content"},
                "mime_type": {"type": "string", "description": "MIME type (default: text/plain)"},
                "persona": {"type": "string", "description": "Target persona (default: 'default')"}
            },
            "required": ["uri", "name", "description", "content"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let uri = required_str(arguments, "uri")?;
        let name = required_str(arguments, "name")?;
        let description = required_str(arguments, "description")?;
        let content = required_str(arguments, "content")?;
        let mime_type = optional_str(arguments, "mime_type", "text/plain");
        let persona = Persona::new(optional_str(arguments, "persona", "default"));

        let record = ResourceRecord {
            uri: uri.to_string(),
            persona: persona.clone(),
            name: name.to_string(),
            description: description.to_string(),
            mime_type: mime_type.to_string(),
            is_dynamic: false,
            static_body: Some(content.to_string()),
            artifact_digest: None,
            group: "general".to_string(),
        };
        dispatcher.state().registry().upsert_resource(&record).await?;

        Ok(json!(format!(
            "Resource '{}' registered for persona '{}' as a static resource ({})",
            uri, persona, mime_type
        )))
    }
}

/// `create_temp_tool`: a SELECT tool living only in process memory, hard
/// capped at 3 rows for cheap iteration.
pub struct CreateTempTool;

#[async_trait]
impl Builtin for CreateTempTool {
    fn name(&self) -> &'static str {
        "create_temp_tool"
    }

    fn description(&self) -> &'static str {
        "Create a temporary test SQL tool (in-memory, automatic LIMIT 3)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Name of the temporary tool"},
                "description": {"type": "string", "description": "What the tool does"},
                "sql_query": {"type": "string", "description": "SELECT template; do not include a LIMIT clause"},
                "parameters": {"type": "object", "description": "Map of parameter name to {type, description, required}"}
            },
            "required": ["tool_name", "description", "sql_query"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let tool_name = required_str(arguments, "tool_name")?;
        let description = required_str(arguments, "description")?;
        let sql_query = required_str(arguments, "sql_query")?;
        let parameters = arguments.get("parameters").cloned().unwrap_or(json!({}));

        validate_select_template(sql_query)?;
        let has_limit = regex::Regex::new(r"(?i)\bLIMIT\b")
            .map(|re| re.is_match(sql_query))
            .unwrap_or(false);
        if has_limit {
            return Err(DispatchError::InvalidInput(
                "do not include a LIMIT clause; test tools enforce LIMIT 3 automatically"
                    .to_string(),
            ));
        }

        let body = sql_query.to_string();
        let tool = TempTool {
            name: tool_name.to_string(),
            persona: ctx.persona.clone(),
            description: description.to_string(),
            input_schema: schema_from_parameters(&parameters),
            digest: Digest::of(&body),
        };
        dispatcher
            .state()
            .temp()
            .put_tool(tool, body, ArtifactKind::Select);

        Ok(json!(format!(
            "Temporary tool '{}' registered for persona '{}'. \
             It returns at most 3 rows and is not persisted.",
            tool_name, ctx.persona
        )))
    }
}

/// `create_temp_resource`: a static resource living only in process
/// memory.
pub struct CreateTempResource;

#[async_trait]
impl Builtin for CreateTempResource {
    fn name(&self) -> &'static str {
        "create_temp_resource"
    }

    fn description(&self) -> &'static str {
        "Create a temporary static resource (in-memory, not persisted)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "uri": {"type": "string", "description": "Resource URI"},
                "name": {"type": "string", "description": "Human-readable name"},
                "description": {"type": "string", "description": "What the resource holds"},
                "content": {"type": "string", "description": "Static text content"},
                "mime_type": {"type": "string", "description": "MIME type (default: text/plain)"}
            },
            "required": ["uri", "name", "description", "content"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let uri = required_str(arguments, "uri")?;
        let name = required_str(arguments, "name")?;
        let description = required_str(arguments, "description")?;
        let content = required_str(arguments, "content")?;
        let mime_type = optional_str(arguments, "mime_type", "text/plain");

        let resource = TempResource {
            uri: uri.to_string(),
            persona: ctx.persona.clone(),
            name: name.to_string(),
            description: description.to_string(),
            mime_type: mime_type.to_string(),
            is_dynamic: false,
            static_body: Some(content.to_string()),
            digest: None,
        };
        dispatcher.state().temp().put_resource(resource, None);

        Ok(json!(format!(
            "Temporary resource '{}' registered for persona '{}'",
            uri, ctx.persona
        )))
    }
}

/// `register_macro`: stores a reusable template macro. Active macros form
/// the prelude prepended to every SQL render.
pub struct RegisterMacro;

#[async_trait]
impl Builtin for RegisterMacro {
    fn name(&self) -> &'static str {
        "register_macro"
    }

    fn description(&self) -> &'static str {
        "Register a reusable template macro for SQL tools"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Macro name (e.g. 'safe_div')"},
                "description": {"type": "string", "description": "What the macro does"},
                "template": {"type": "string", "description": "Single {% macro %}...{% endmacro %} block"}
            },
            "required": ["name", "description", "template"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let name = required_str(arguments, "name")?;
        let description = required_str(arguments, "description")?;
        let template = required_str(arguments, "template")?;

        if !is_macro_block(template) {
            return Err(DispatchError::InvalidInput(
                "template must start with '{% macro' and end with '{% endmacro %}'".to_string(),
            ));
        }

        dispatcher
            .state()
            .registry()
            .upsert_macro(&MacroRecord {
                name: name.to_string(),
                description: description.to_string(),
                template: template.to_string(),
                is_active: true,
            })
            .await?;
        dispatcher.state().invalidate_macro_prelude();

        Ok(json!(format!(
            "Macro '{}' registered and active for all SQL tools",
            name
        )))
    }
}

/// `create_dashboard`: stores a `ui`-kind artifact, writes its body to the
/// dashboard storage directory, and registers a tool whose dispatch
/// returns the runner URL.
pub struct CreateDashboard;

#[async_trait]
impl Builtin for CreateDashboard {
    fn name(&self) -> &'static str {
        "create_dashboard"
    }

    fn description(&self) -> &'static str {
        "Create a dashboard served by the external UI runner"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "tool_name": {"type": "string", "description": "Dashboard tool name"},
                "description": {"type": "string", "description": "What the dashboard shows"},
                "content": {"type": "string", "description": "Dashboard body handed to the UI runner"}
            },
            "required": ["tool_name", "description", "content"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let config = dispatcher.state().config().dashboard.clone();
        if !config.enabled {
            return Err(DispatchError::DashboardDisabled);
        }

        let tool_name = required_str(arguments, "tool_name")?;
        let description = required_str(arguments, "description")?;
        let content = required_str(arguments, "content")?;

        let record = ToolRecord {
            name: tool_name.to_string(),
            persona: Persona::default(),
            description: description.to_string(),
            input_schema: json!({"type": "object", "properties": {}}),
            artifact_digest: Digest::of(content),
            is_auto_created: true,
            group: "dashboard".to_string(),
            manual: None,
        };
        dispatcher
            .state()
            .registry()
            .upsert_tool_with_artifact(&record, content, ArtifactKind::Ui)
            .await?;

        // The runner reads bodies from the storage directory by tool name.
        let path = std::path::Path::new(&config.storage_dir).join(format!("{}.app", tool_name));
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                tracing::warn!(error = %e, "failed to create dashboard storage dir");
            }
        }
        if let Err(e) = tokio::fs::write(&path, content).await {
            tracing::warn!(error = %e, path = %path.display(), "failed to write dashboard body");
        }

        Ok(json!(format!(
            "Dashboard '{}' is ready. Access it at: {}",
            tool_name,
            dispatcher.dashboard_url(tool_name)
        )))
    }
}
