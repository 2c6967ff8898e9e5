//! First-run registry seeding.
//!
//! When the tool table is empty, the server registers the system meta-tools
//! and a small starter set so a fresh database is immediately usable. Each
//! meta-tool row points at a canonical stub script artifact; dispatch
//! routes the system group to native implementations, so the stubs exist
//! for integrity checks and listings only.

use serde_json::json;

use quiver_core::Persona;
use quiver_registry::{
    ManualExample, PromptArgument, PromptRecord, ResourceRecord, ToolManual, ToolRecord,
};
use quiver_store::{ArtifactKind, Digest};

use crate::builtins::Builtins;
use crate::error::DispatchError;
use crate::state::ServerState;

/// The starter greeting tool, stored as a real plugin script.
const GREET_SCRIPT: &str = r#"class Greeter(Tool) {
    fn run(self, arguments) {
        let name = arguments["name"];
        if name == null { return "Hello, stranger!"; }
        return "Hello, " + str(name) + "!";
    }
}
"#;

/// Seed the registry when it is empty. Idempotent across restarts: a
/// non-empty tool table short-circuits.
pub async fn seed_if_empty(state: &ServerState) -> Result<(), DispatchError> {
    if state.registry().count_tools().await? > 0 {
        return Ok(());
    }
    tracing::info!("empty registry detected; seeding system tools");

    let builtins = Builtins::standard();
    for builtin in builtins.iter() {
        let body = stub_script(builtin.name());
        let record = ToolRecord {
            name: builtin.name().to_string(),
            persona: Persona::default(),
            description: builtin.description().to_string(),
            input_schema: builtin.input_schema(),
            artifact_digest: Digest::of(&body),
            is_auto_created: false,
            group: "system".to_string(),
            manual: None,
        };
        state
            .registry()
            .upsert_tool_with_artifact(&record, &body, ArtifactKind::Script)
            .await?;
    }

    let greet = ToolRecord {
        name: "utility_greet".to_string(),
        persona: Persona::default(),
        description: "Greet someone by name".to_string(),
        input_schema: json!({
            "type": "object",
            "properties": {
                "name": {"type": "string", "description": "Who to greet"}
            }
        }),
        artifact_digest: Digest::of(GREET_SCRIPT),
        is_auto_created: false,
        group: "general".to_string(),
        manual: Some(ToolManual {
            usage_guide: "Pass a 'name' argument; omit it for a generic greeting.".to_string(),
            examples: vec![ManualExample {
                input: json!({"name": "World"}),
                expect: Some("Hello".to_string()),
                verified: false,
            }],
            pitfalls: vec![],
            error_codes: vec![],
        }),
    };
    state
        .registry()
        .upsert_tool_with_artifact(&greet, GREET_SCRIPT, ArtifactKind::Script)
        .await?;

    state
        .registry()
        .upsert_resource(&ResourceRecord {
            uri: "memo://welcome".to_string(),
            persona: Persona::default(),
            name: "Welcome".to_string(),
            description: "How this server works".to_string(),
            mime_type: "text/plain".to_string(),
            is_dynamic: false,
            static_body: Some(
                "This server's tools live in its registry database. \
                 Use create_new_sql_tool and the other system tools to extend it."
                    .to_string(),
            ),
            artifact_digest: None,
            group: "system".to_string(),
        })
        .await?;

    state
        .registry()
        .upsert_prompt(&PromptRecord {
            name: "review_code".to_string(),
            persona: Persona::default(),
            description: "Review a piece of code".to_string(),
            template: "Please review this {language} code for correctness and style:\n\n{code}"
                .to_string(),
            arguments: vec![
                PromptArgument {
                    name: "language".to_string(),
                    description: "Language of the code".to_string(),
                    required: true,
                },
                PromptArgument {
                    name: "code".to_string(),
                    description: "The code to review".to_string(),
                    required: true,
                },
            ],
            group: "system".to_string(),
        })
        .await?;

    Ok(())
}

/// A canonical stub script for a meta-tool artifact row.
fn stub_script(name: &str) -> String {
    format!(
        "# Built-in tool; dispatch routes this name to the native implementation.\n\
         class {}(Tool) {{\n    fn run(self, arguments) {{\n        \
         return \"{} is provided by the runtime.\";\n    }}\n}}\n",
        camel_case(name),
        name
    )
}

fn camel_case(name: &str) -> String {
    name.split('_')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_scripts_are_valid_plugin_scripts() {
        let body = stub_script("create_new_sql_tool");
        let script = quiver_script::parse(&body).unwrap();
        quiver_script::find_tool_class(&script).unwrap();
    }

    #[test]
    fn greet_script_parses() {
        let script = quiver_script::parse(GREET_SCRIPT).unwrap();
        let class = quiver_script::find_tool_class(&script).unwrap();
        assert_eq!(class.name, "Greeter");
    }
}
