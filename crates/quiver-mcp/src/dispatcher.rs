//! The dispatcher: resolve, validate, route, audit.
//!
//! Resolution order is temporary registry first, then the persistent
//! tables. Every artifact load re-hashes the stored body against its
//! digest. Success and failure both produce exactly one execution log
//! entry; failures additionally append a lesson to the notebook's
//! self-correction domain before the original error is re-raised.
//!
//! Persona is a namespace, not an access-control boundary: listings are
//! scoped by persona, but a caller naming both tool and persona explicitly
//! may invoke across personas.

use std::sync::Arc;

use serde_json::{json, Value};

use quiver_audit::ExecutionEntry;
use quiver_core::Persona;
use quiver_store::{Artifact, ArtifactKind};

use crate::builtins::Builtins;
use crate::error::DispatchError;
use crate::protocol::{
    PromptDescriptor, PromptResult, ResourceDescriptor, ToolDescriptor,
};
use crate::script_exec::{complete_script, execute_script};
use crate::sql_exec::{complete_column_values, execute_select, LimitPolicy};
use crate::state::ServerState;

/// Cap on sub-executor nesting. Chains and scripts re-enter `call_tool`;
/// a tool that calls itself would otherwise recurse without bound.
const MAX_CALL_DEPTH: u32 = 16;

/// Resolved resource content plus its declared MIME type.
#[derive(Debug, Clone)]
pub struct ResourceContent {
    pub body: String,
    pub mime_type: String,
}

/// Per-call context handed to builtins.
#[derive(Debug, Clone)]
pub struct CallContext {
    pub persona: Persona,
    pub tool_name: String,
    pub depth: u32,
}

/// The dispatcher. Cheap to clone; all state lives behind the shared
/// [`ServerState`].
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<ServerState>,
    builtins: Arc<Builtins>,
}

impl Dispatcher {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            state,
            builtins: Arc::new(Builtins::standard()),
        }
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    // ===== Listings =====

    /// Tools visible to a persona: persistent rows ordered by
    /// `(group, name)`, then temporary tools. Auto-created and temporary
    /// entries are marked in the description.
    pub async fn list_tools(
        &self,
        persona: &Persona,
    ) -> Result<Vec<ToolDescriptor>, DispatchError> {
        let mut descriptors = Vec::new();
        for record in self.state.registry().list_tools(persona).await? {
            let description = if record.is_auto_created {
                format!("[AUTO] {}", record.description)
            } else {
                record.description.clone()
            };
            descriptors.push(ToolDescriptor {
                name: record.name,
                description,
                input_schema: record.input_schema,
            });
        }
        for tool in self.state.temp().list_tools(persona) {
            descriptors.push(ToolDescriptor {
                name: tool.name,
                description: format!("[TEMP] {}", tool.description),
                input_schema: tool.input_schema,
            });
        }
        Ok(descriptors)
    }

    pub async fn list_resources(
        &self,
        persona: &Persona,
    ) -> Result<Vec<ResourceDescriptor>, DispatchError> {
        let mut descriptors = Vec::new();
        for record in self.state.registry().list_resources(persona).await? {
            descriptors.push(ResourceDescriptor {
                uri: record.uri,
                name: record.name,
                description: record.description,
                mime_type: record.mime_type,
            });
        }
        for resource in self.state.temp().list_resources(persona) {
            descriptors.push(ResourceDescriptor {
                uri: resource.uri,
                name: resource.name,
                description: format!("[TEMP] {}", resource.description),
                mime_type: resource.mime_type,
            });
        }
        Ok(descriptors)
    }

    pub async fn list_prompts(
        &self,
        persona: &Persona,
    ) -> Result<Vec<PromptDescriptor>, DispatchError> {
        let records = self.state.registry().list_prompts(persona).await?;
        Ok(records
            .into_iter()
            .map(|record| PromptDescriptor {
                name: record.name,
                description: record.description,
                arguments: record
                    .arguments
                    .into_iter()
                    .map(|a| crate::protocol::PromptArgumentDescriptor {
                        name: a.name,
                        description: a.description,
                        required: a.required,
                    })
                    .collect(),
            })
            .collect())
    }

    // ===== Tool dispatch =====

    /// Dispatch a tool call and audit the outcome.
    pub async fn call_tool(
        &self,
        name: &str,
        persona: &Persona,
        arguments: Value,
    ) -> Result<Value, DispatchError> {
        self.call_tool_at_depth(name, persona, arguments, 0).await
    }

    /// Entry point for sub-executors (scripts and chains), which carry a
    /// nesting depth.
    pub async fn call_tool_at_depth(
        &self,
        name: &str,
        persona: &Persona,
        arguments: Value,
        depth: u32,
    ) -> Result<Value, DispatchError> {
        // Race the work against the cancellation signal: a cancelled call
        // lands in the audit log as a FAILURE with a Cancelled diagnostic,
        // and dropping the dispatch future releases any held session.
        let mut cancel = self.state.cancel_signal();
        let outcome = if depth > MAX_CALL_DEPTH {
            Err(DispatchError::RecursionLimit { depth })
        } else if *cancel.borrow() {
            Err(DispatchError::Cancelled)
        } else {
            tokio::select! {
                outcome = self.dispatch(name, persona, &arguments, depth) => outcome,
                _ = cancel.changed() => Err(DispatchError::Cancelled),
            }
        };

        match outcome {
            Ok(value) => {
                let summary = render_summary(&value);
                self.state
                    .recorder()
                    .record(&ExecutionEntry::success(
                        name, persona, &arguments, &summary,
                    ))
                    .await;
                tracing::info!(tool = %name, persona = %persona, "tool call succeeded");
                Ok(value)
            }
            Err(error) => {
                let traceback = error.traceback();
                self.state
                    .recorder()
                    .record(&ExecutionEntry::failure(
                        name, persona, &arguments, &traceback,
                    ))
                    .await;
                if let Err(e) = self
                    .state
                    .notebook()
                    .append_self_correction(name, &error.to_string())
                    .await
                {
                    tracing::warn!(error = %e, "failed to append self-correction note");
                }
                tracing::error!(tool = %name, persona = %persona, error = %error, "tool call failed");
                Err(error)
            }
        }
    }

    async fn dispatch(
        &self,
        name: &str,
        persona: &Persona,
        arguments: &Value,
        depth: u32,
    ) -> Result<Value, DispatchError> {
        // Temporary registry wins over the persistent one.
        if let Some(tool) = self.state.temp().get_tool(name, persona) {
            let artifact = self.state.temp().get_artifact(&tool.digest).ok_or_else(|| {
                DispatchError::ArtifactMissing {
                    name: name.to_string(),
                    digest: tool.digest.to_string(),
                }
            })?;
            return match artifact.kind {
                ArtifactKind::Select => {
                    execute_select(&self.state, &artifact.body, arguments, LimitPolicy::Temp)
                        .await
                }
                ArtifactKind::Script => {
                    execute_script(
                        self,
                        persona,
                        name,
                        depth,
                        &artifact.body,
                        arguments,
                        json!({}),
                    )
                    .await
                }
                ArtifactKind::Ui => Ok(Value::String(self.dashboard_url(name))),
            };
        }

        let record = self
            .state
            .registry()
            .get_tool(name, persona)
            .await?
            .ok_or_else(|| DispatchError::ToolNotFound {
                name: name.to_string(),
                persona: persona.to_string(),
            })?;

        // System-group rows resolve to native implementations; their
        // artifact rows exist for integrity and listing only.
        if record.group == "system" {
            if let Some(builtin) = self.builtins.get(name) {
                let ctx = CallContext {
                    persona: persona.clone(),
                    tool_name: name.to_string(),
                    depth,
                };
                return builtin.run(self, &ctx, arguments).await;
            }
        }

        let artifact = self.load_artifact(name, &record.artifact_digest).await?;
        match artifact.kind {
            ArtifactKind::Select => {
                let limit = if record.is_auto_created {
                    LimitPolicy::AutoCreated
                } else {
                    LimitPolicy::None
                };
                execute_select(&self.state, &artifact.body, arguments, limit).await
            }
            ArtifactKind::Script => {
                execute_script(
                    self,
                    persona,
                    name,
                    depth,
                    &artifact.body,
                    arguments,
                    json!({}),
                )
                .await
            }
            ArtifactKind::Ui => Ok(Value::String(self.dashboard_url(name))),
        }
    }

    async fn load_artifact(
        &self,
        name: &str,
        digest: &quiver_store::Digest,
    ) -> Result<Artifact, DispatchError> {
        let artifact = self.state.registry().store().get(digest).await?.ok_or_else(|| {
            DispatchError::ArtifactMissing {
                name: name.to_string(),
                digest: digest.to_string(),
            }
        })?;
        if !artifact.verify_integrity() {
            return Err(DispatchError::ArtifactCorrupt {
                digest: digest.to_string(),
            });
        }
        Ok(artifact)
    }

    /// URL handed back for `ui`-kind dispatches, pointing the client at
    /// the external runner.
    pub fn dashboard_url(&self, tool_name: &str) -> String {
        format!(
            "{}/?page={}",
            self.state.config().dashboard.runner_url.trim_end_matches('/'),
            tool_name
        )
    }

    // ===== Resources =====

    /// Resolve a resource: static bodies verbatim, dynamic artifacts
    /// executed with `{uri, persona}` as arguments.
    pub async fn read_resource(
        &self,
        uri: &str,
        persona: &Persona,
    ) -> Result<ResourceContent, DispatchError> {
        let resource_args = json!({
            "uri": uri,
            "persona": persona.as_str(),
        });

        if let Some(resource) = self.state.temp().get_resource(uri, persona) {
            if !resource.is_dynamic {
                return Ok(ResourceContent {
                    body: resource.static_body.unwrap_or_default(),
                    mime_type: resource.mime_type,
                });
            }
            let digest = resource.digest.ok_or_else(|| DispatchError::ResourceNotFound {
                uri: uri.to_string(),
                persona: persona.to_string(),
            })?;
            let artifact = self.state.temp().get_artifact(&digest).ok_or_else(|| {
                DispatchError::ArtifactMissing {
                    name: uri.to_string(),
                    digest: digest.to_string(),
                }
            })?;
            let body = self
                .execute_resource_artifact(uri, persona, artifact.body, artifact.kind, &resource_args)
                .await?;
            return Ok(ResourceContent {
                body,
                mime_type: resource.mime_type,
            });
        }

        let record = self
            .state
            .registry()
            .get_resource(uri, persona)
            .await?
            .ok_or_else(|| DispatchError::ResourceNotFound {
                uri: uri.to_string(),
                persona: persona.to_string(),
            })?;

        if !record.is_dynamic {
            return Ok(ResourceContent {
                body: record.static_body.unwrap_or_default(),
                mime_type: record.mime_type,
            });
        }

        let digest = record
            .artifact_digest
            .ok_or_else(|| DispatchError::ResourceNotFound {
                uri: uri.to_string(),
                persona: persona.to_string(),
            })?;
        let artifact = self.load_artifact(uri, &digest).await?;
        let body = self
            .execute_resource_artifact(uri, persona, artifact.body, artifact.kind, &resource_args)
            .await?;
        Ok(ResourceContent {
            body,
            mime_type: record.mime_type,
        })
    }

    async fn execute_resource_artifact(
        &self,
        uri: &str,
        persona: &Persona,
        body: String,
        kind: ArtifactKind,
        resource_args: &Value,
    ) -> Result<String, DispatchError> {
        match kind {
            ArtifactKind::Select => {
                let value =
                    execute_select(&self.state, &body, resource_args, LimitPolicy::None).await?;
                Ok(render_summary(&value))
            }
            ArtifactKind::Script => {
                let value = execute_script(
                    self,
                    persona,
                    uri,
                    0,
                    &body,
                    resource_args,
                    json!({"uri": uri}),
                )
                .await?;
                Ok(render_summary(&value))
            }
            ArtifactKind::Ui => Ok(self.dashboard_url(uri)),
        }
    }

    // ===== Prompts =====

    /// Load a prompt template and substitute `{name}` placeholders.
    pub async fn get_prompt(
        &self,
        name: &str,
        persona: &Persona,
        arguments: &Value,
    ) -> Result<PromptResult, DispatchError> {
        let record = self
            .state
            .registry()
            .get_prompt(name, persona)
            .await?
            .ok_or_else(|| DispatchError::PromptNotFound {
                name: name.to_string(),
                persona: persona.to_string(),
            })?;

        for argument in &record.arguments {
            if argument.required && arguments.get(&argument.name).is_none() {
                return Err(DispatchError::MissingArgument {
                    name: argument.name.clone(),
                });
            }
        }

        let text = format_prompt(&record.template, arguments)?;
        Ok(PromptResult::user_text(&record.description, text))
    }

    // ===== Completion =====

    /// Completion suggestions for a tool argument: the plugin's `complete`
    /// method for scripts, a distinct-value column scan for SQL tools.
    pub async fn complete_tool_argument(
        &self,
        tool_name: &str,
        persona: &Persona,
        argument: &str,
        value: &str,
    ) -> Result<Vec<String>, DispatchError> {
        let artifact = if let Some(tool) = self.state.temp().get_tool(tool_name, persona) {
            self.state
                .temp()
                .get_artifact(&tool.digest)
                .map(|a| (a.body, a.kind))
        } else {
            let record = self
                .state
                .registry()
                .get_tool(tool_name, persona)
                .await?
                .ok_or_else(|| DispatchError::ToolNotFound {
                    name: tool_name.to_string(),
                    persona: persona.to_string(),
                })?;
            self.state
                .registry()
                .store()
                .get(&record.artifact_digest)
                .await?
                .map(|a| (a.body, a.kind))
        };

        let Some((body, kind)) = artifact else {
            return Ok(Vec::new());
        };
        match kind {
            ArtifactKind::Select => {
                let Some(session) = self.state.data_session() else {
                    return Ok(Vec::new());
                };
                Ok(complete_column_values(&session, argument, value).await)
            }
            ArtifactKind::Script => {
                complete_script(self, persona, tool_name, &body, argument, value).await
            }
            ArtifactKind::Ui => Ok(Vec::new()),
        }
    }

    /// Bounded manual excerpt appended to client-facing error text when
    /// the failing tool documents itself.
    pub async fn manual_excerpt(&self, tool_name: &str, persona: &Persona) -> Option<String> {
        let record = self
            .state
            .registry()
            .get_tool(tool_name, persona)
            .await
            .ok()??;
        let manual = record.manual?;
        let excerpt = json!({
            "usage_guide": manual.usage_guide,
            "examples": manual.examples.iter().take(2).collect::<Vec<_>>(),
            "pitfalls": manual.pitfalls,
        });
        let text = serde_json::to_string_pretty(&excerpt).ok()?;
        if text.chars().count() > 1500 {
            let mut truncated: String = text.chars().take(1500).collect();
            truncated.push_str("\n... (truncated, use 'system_inspect_tool' for more)");
            return Some(truncated);
        }
        Some(text)
    }
}

/// Render a result value as text for summaries and resource bodies.
pub fn render_summary(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute `{name}` placeholders from the argument bag. A placeholder
/// with no matching argument is a missing-argument error.
fn format_prompt(template: &str, arguments: &Value) -> Result<String, DispatchError> {
    let mut out = String::with_capacity(template.len());
    let chars: Vec<char> = template.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '{' {
            if i + 1 < chars.len() && chars[i + 1] == '{' {
                out.push('{');
                i += 2;
                continue;
            }
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && chars[end] != '}' {
                end += 1;
            }
            if end >= chars.len() {
                out.push('{');
                i += 1;
                continue;
            }
            let name: String = chars[start..end].iter().collect();
            let value = arguments
                .get(&name)
                .ok_or_else(|| DispatchError::MissingArgument { name: name.clone() })?;
            out.push_str(&render_summary(value));
            i = end + 1;
            continue;
        }
        if chars[i] == '}' && i + 1 < chars.len() && chars[i + 1] == '}' {
            out.push('}');
            i += 2;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_formatting_substitutes_and_reports_missing() {
        let text = format_prompt(
            "Review {language} code: {code}",
            &json!({"language": "Rust", "code": "fn main() {}"}),
        )
        .unwrap();
        assert_eq!(text, "Review Rust code: fn main() {}");

        let err = format_prompt("Hello {name}", &json!({})).unwrap_err();
        assert!(matches!(err, DispatchError::MissingArgument { name } if name == "name"));
    }

    #[test]
    fn prompt_braces_escape() {
        let text = format_prompt("{{literal}} {x}", &json!({"x": 1})).unwrap();
        assert_eq!(text, "{literal} 1");
    }
}
