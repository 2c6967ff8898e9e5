//! MCP protocol types.
//!
//! JSON-RPC message shapes for the MCP request set the core consumes.
//! Transport (stdio line framing or SSE over HTTP) lives in
//! [`crate::transport`]; handlers see these typed structures only.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

/// A tool as presented to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Parameters of `tools/call`.
#[derive(Debug, Clone, Deserialize)]
pub struct CallToolParams {
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(rename = "_meta", default)]
    pub meta: Option<Value>,
}

/// A resource as presented to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub uri: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}

/// A prompt as presented to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptDescriptor {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgumentDescriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgumentDescriptor {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Result of `prompts/get`: a one-message user prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptResult {
    pub description: String,
    pub messages: Vec<PromptMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptMessage {
    pub role: String,
    pub content: PromptContent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptContent {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

impl PromptResult {
    pub fn user_text(description: &str, text: String) -> Self {
        Self {
            description: description.to_string(),
            messages: vec![PromptMessage {
                role: "user".to_string(),
                content: PromptContent {
                    content_type: "text".to_string(),
                    text,
                },
            }],
        }
    }
}

/// Parameters of `completion/complete`.
#[derive(Debug, Clone, Deserialize)]
pub struct CompletionParams {
    #[serde(rename = "ref")]
    pub reference: Value,
    pub argument: CompletionArgument,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CompletionArgument {
    pub name: String,
    #[serde(default)]
    pub value: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_parses_without_params() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#).unwrap();
        assert_eq!(req.method, "tools/list");
        assert!(req.params.is_none());
    }

    #[test]
    fn call_params_accept_meta() {
        let params: CallToolParams = serde_json::from_value(json!({
            "name": "utility_greet",
            "arguments": {"name": "World"},
            "_meta": {"persona": "analyst"}
        }))
        .unwrap();
        assert_eq!(params.name, "utility_greet");
        assert_eq!(params.meta.unwrap()["persona"], "analyst");
    }

    #[test]
    fn error_responses_serialize_the_error_member() {
        let response = JsonRpcResponse::error(Some(json!(7)), -32601, "nope");
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.contains("\"error\""));
        assert!(!text.contains("\"result\""));
    }
}
