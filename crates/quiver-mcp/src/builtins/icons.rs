//! Icon meta-tools: register and list tool icons.

use async_trait::async_trait;
use base64::Engine;
use serde_json::{json, Value};

use quiver_registry::{IconFormat, IconRecord};

use super::{optional_str, required_str, Builtin};
use crate::dispatcher::{CallContext, Dispatcher};
use crate::error::DispatchError;

/// `register_icon`: store an SVG or PNG icon under a name.
pub struct RegisterIcon;

#[async_trait]
impl Builtin for RegisterIcon {
    fn name(&self) -> &'static str {
        "register_icon"
    }

    fn description(&self) -> &'static str {
        "Register a named icon (svg or png, base64-encoded body)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Icon name"},
                "format": {"type": "string", "enum": ["svg", "png"], "description": "Icon format"},
                "body_base64": {"type": "string", "description": "Base64-encoded icon body"}
            },
            "required": ["name", "format", "body_base64"]
        })
    }

    async fn run(
        &self,
        dispatcher: &Dispatcher,
        _ctx: &CallContext,
        arguments: &Value,
    ) -> Result<Value, DispatchError> {
        let name = required_str(arguments, "name")?;
        let format = match optional_str(arguments, "format", "svg") {
            "svg" => IconFormat::Svg,
            "png" => IconFormat::Png,
            other => {
                return Err(DispatchError::InvalidInput(format!(
                    "format must be svg or png, got '{other}'"
                )))
            }
        };
        let body = required_str(arguments, "body_base64")?;
        if base64::engine::general_purpose::STANDARD
            .decode(body)
            .is_err()
        {
            return Err(DispatchError::InvalidInput(
                "body_base64 is not valid base64".to_string(),
            ));
        }

        dispatcher
            .state()
            .registry()
            .upsert_icon(&IconRecord {
                name: name.to_string(),
                format,
                body_base64: body.to_string(),
            })
            .await?;
        Ok(json!(format!("Icon '{}' registered", name)))
    }
}

/// `system_list_icons`: names and formats of every stored icon.
pub struct ListIcons;

#[async_trait]
impl Builtin for ListIcons {
    fn name(&self) -> &'static str {
        "system_list_icons"
    }

    fn description(&self) -> &'static str {
        "List registered icons"
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
        let icons = dispatcher.state().registry().list_icons().await?;
        Ok(json!(icons
            .into_iter()
            .map(|icon| json!({"name": icon.name, "format": icon.format.as_str()}))
            .collect::<Vec<_>>()))
    }
}
