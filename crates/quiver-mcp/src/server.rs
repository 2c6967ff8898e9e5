//! MCP request handling over the dispatcher.

use std::io::{BufRead, Write};
use std::sync::Arc;

use serde_json::{json, Value};

use quiver_core::Persona;

use crate::dispatcher::Dispatcher;
use crate::protocol::*;
use crate::state::ServerState;
use crate::toon;

/// The MCP server: typed request in, typed response out. Transports feed
/// it from stdio or HTTP.
#[derive(Clone)]
pub struct McpServer {
    dispatcher: Dispatcher,
}

impl McpServer {
    pub fn new(state: Arc<ServerState>) -> Self {
        Self {
            dispatcher: Dispatcher::new(state),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Handle one JSON-RPC request.
    pub async fn handle_request(&self, request: JsonRpcRequest) -> JsonRpcResponse {
        let id = request.id.clone();
        match request.method.as_str() {
            "initialize" => self.handle_initialize(id),
            "initialized" | "notifications/initialized" => {
                JsonRpcResponse::success(id, json!({}))
            }
            "tools/list" => self.handle_list_tools(id, request.params).await,
            "tools/call" => self.handle_call_tool(id, request.params).await,
            "resources/list" => self.handle_list_resources(id, request.params).await,
            "resources/read" => self.handle_read_resource(id, request.params).await,
            "prompts/list" => self.handle_list_prompts(id, request.params).await,
            "prompts/get" => self.handle_get_prompt(id, request.params).await,
            "completion/complete" => self.handle_completion(id, request.params).await,
            "shutdown" => {
                tracing::info!("shutdown requested; cancelling in-flight calls");
                self.dispatcher.state().cancel_all();
                JsonRpcResponse::success(id, json!(null))
            }
            other => {
                JsonRpcResponse::error(id, -32601, format!("Method not found: {}", other))
            }
        }
    }

    fn handle_initialize(&self, id: Option<Value>) -> JsonRpcResponse {
        JsonRpcResponse::success(
            id,
            json!({
                "protocolVersion": "2024-11-05",
                "serverInfo": {
                    "name": "quiver",
                    "version": env!("CARGO_PKG_VERSION")
                },
                "capabilities": {
                    "tools": {"listChanged": true},
                    "resources": {},
                    "prompts": {},
                    "completions": {}
                }
            }),
        )
    }

    async fn handle_list_tools(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let persona = persona_from_params(&params);
        match self.dispatcher.list_tools(&persona).await {
            Ok(tools) => JsonRpcResponse::success(id, json!({ "tools": tools })),
            Err(e) => JsonRpcResponse::error(id, -32603, e.to_string()),
        }
    }

    async fn handle_call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => return JsonRpcResponse::error(id, -32602, "Missing params"),
            Err(e) => {
                return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e))
            }
        };

        let persona = persona_from_meta(&params.meta);

        // The output format hint travels inside the argument bag and
        // governs only the final text rendering.
        let mut arguments = params.arguments;
        if arguments.is_null() {
            arguments = json!({});
        }
        let format = arguments
            .as_object_mut()
            .and_then(|o| o.remove("_format"))
            .and_then(|v| v.as_str().map(str::to_lowercase))
            .unwrap_or_else(|| "json".to_string());

        match self
            .dispatcher
            .call_tool(&params.name, &persona, arguments)
            .await
        {
            Ok(value) => {
                let text = match format.as_str() {
                    "toon" => toon::encode(&value),
                    _ => match &value {
                        Value::String(s) => s.clone(),
                        other => serde_json::to_string_pretty(other)
                            .unwrap_or_else(|_| other.to_string()),
                    },
                };
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": text}],
                        "isError": false
                    }),
                )
            }
            Err(e) => {
                let mut text = format!("Error: {}", e);
                if let Some(excerpt) =
                    self.dispatcher.manual_excerpt(&params.name, &persona).await
                {
                    text.push_str(&format!(
                        "\n\nManual for '{}' (use it to correct the call):\n{}",
                        params.name, excerpt
                    ));
                }
                JsonRpcResponse::success(
                    id,
                    json!({
                        "content": [{"type": "text", "text": text}],
                        "isError": true
                    }),
                )
            }
        }
    }

    async fn handle_list_resources(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let persona = persona_from_params(&params);
        match self.dispatcher.list_resources(&persona).await {
            Ok(resources) => JsonRpcResponse::success(id, json!({ "resources": resources })),
            Err(e) => JsonRpcResponse::error(id, -32603, e.to_string()),
        }
    }

    async fn handle_read_resource(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let persona = persona_from_params(&params);
        let uri = params
            .as_ref()
            .and_then(|p| p.get("uri"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let Some(uri) = uri else {
            return JsonRpcResponse::error(id, -32602, "Missing uri");
        };

        match self.dispatcher.read_resource(&uri, &persona).await {
            Ok(content) => JsonRpcResponse::success(
                id,
                json!({
                    "contents": [{
                        "uri": uri,
                        "mimeType": content.mime_type,
                        "text": content.body
                    }]
                }),
            ),
            Err(e) => JsonRpcResponse::error(id, -32002, e.to_string()),
        }
    }

    async fn handle_list_prompts(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let persona = persona_from_params(&params);
        match self.dispatcher.list_prompts(&persona).await {
            Ok(prompts) => JsonRpcResponse::success(id, json!({ "prompts": prompts })),
            Err(e) => JsonRpcResponse::error(id, -32603, e.to_string()),
        }
    }

    async fn handle_get_prompt(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let persona = persona_from_params(&params);
        let name = params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let Some(name) = name else {
            return JsonRpcResponse::error(id, -32602, "Missing name");
        };
        let arguments = params
            .as_ref()
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or_else(|| json!({}));

        match self.dispatcher.get_prompt(&name, &persona, &arguments).await {
            Ok(result) => match serde_json::to_value(result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => JsonRpcResponse::error(id, -32603, e.to_string()),
            },
            Err(e) => JsonRpcResponse::error(id, -32602, e.to_string()),
        }
    }

    async fn handle_completion(
        &self,
        id: Option<Value>,
        params: Option<Value>,
    ) -> JsonRpcResponse {
        let persona = persona_from_params(&params);
        let params: CompletionParams = match params.map(serde_json::from_value).transpose() {
            Ok(Some(params)) => params,
            Ok(None) => return JsonRpcResponse::error(id, -32602, "Missing params"),
            Err(e) => {
                return JsonRpcResponse::error(id, -32602, format!("Invalid params: {}", e))
            }
        };

        let tool_name = params
            .reference
            .get("name")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();

        let values = self
            .dispatcher
            .complete_tool_argument(
                &tool_name,
                &persona,
                &params.argument.name,
                &params.argument.value,
            )
            .await
            .unwrap_or_default();

        let total = values.len();
        JsonRpcResponse::success(
            id,
            json!({
                "completion": {
                    "values": values,
                    "total": total,
                    "hasMore": false
                }
            }),
        )
    }

    /// Serve line-delimited JSON-RPC over standard streams until EOF.
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        tracing::info!("MCP server listening on stdio");
        let stdin = std::io::stdin();
        let stdout = std::io::stdout();
        let mut stdout_lock = stdout.lock();

        for line in stdin.lock().lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let response = match serde_json::from_str::<JsonRpcRequest>(&line) {
                Ok(request) => self.handle_request(request).await,
                Err(e) => {
                    JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e))
                }
            };
            let text = serde_json::to_string(&response)?;
            writeln!(stdout_lock, "{}", text)?;
            stdout_lock.flush()?;
        }
        Ok(())
    }
}

/// Persona lives in the `_meta.persona` slot of request params; absent
/// means `"default"`.
fn persona_from_params(params: &Option<Value>) -> Persona {
    params
        .as_ref()
        .and_then(|p| p.get("_meta"))
        .and_then(|m| m.get("persona"))
        .and_then(|v| v.as_str())
        .map(Persona::new)
        .unwrap_or_default()
}

fn persona_from_meta(meta: &Option<Value>) -> Persona {
    meta.as_ref()
        .and_then(|m| m.get("persona"))
        .and_then(|v| v.as_str())
        .map(Persona::new)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quiver_core::QuiverConfig;
    use sqlx::any::AnyPoolOptions;

    async fn test_server() -> McpServer {
        sqlx::any::install_default_drivers();
        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let mut config = QuiverConfig::default();
        config.databases.metadata_url = "sqlite::memory:".to_string();
        let state = ServerState::open_with_pools(config, pool, None).await.unwrap();
        McpServer::new(state)
    }

    fn request(method: &str, params: Option<Value>) -> JsonRpcRequest {
        JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(json!(1)),
            method: method.to_string(),
            params,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn initialize_advertises_capabilities() {
        let server = test_server().await;
        let response = server.handle_request(request("initialize", None)).await;
        let result = response.result.unwrap();
        assert_eq!(result["serverInfo"]["name"], "quiver");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn tools_list_returns_the_seeded_registry() {
        let server = test_server().await;
        let response = server.handle_request(request("tools/list", None)).await;
        let tools = response.result.unwrap()["tools"].as_array().unwrap().len();
        assert!(tools > 10, "seeded meta-tools plus the starter tool");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn calling_a_missing_tool_reports_is_error() {
        let server = test_server().await;
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "nonexistent", "arguments": {}})),
            ))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], true);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("not found"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn unknown_methods_are_rejected() {
        let server = test_server().await;
        let response = server.handle_request(request("bogus/method", None)).await;
        assert!(response.error.is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn greet_via_protocol_renders_text_content() {
        let server = test_server().await;
        let response = server
            .handle_request(request(
                "tools/call",
                Some(json!({"name": "utility_greet", "arguments": {"name": "World"}})),
            ))
            .await;
        let result = response.result.unwrap();
        assert_eq!(result["isError"], false);
        assert!(result["content"][0]["text"]
            .as_str()
            .unwrap()
            .contains("Hello, World!"));
    }
}
