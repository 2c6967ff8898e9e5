//! The seeded starter tool, listings, and audit completeness.

use serde_json::json;

use quiver_core::Persona;

use super::common::online_dispatcher;

#[tokio::test(flavor = "multi_thread")]
async fn greet_returns_a_greeting_and_one_audit_entry() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    let result = dispatcher
        .call_tool("utility_greet", &persona, json!({"name": "World"}))
        .await
        .unwrap();

    let text = result.as_str().unwrap();
    assert!(text.contains("Hello"));
    assert!(text.contains("World"));

    let entries = dispatcher
        .state()
        .recorder()
        .recent("utility_greet", 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, quiver_audit::ExecutionStatus::Success);
    assert_eq!(entries[0].persona, persona);
}

#[tokio::test(flavor = "multi_thread")]
async fn greet_without_a_name_falls_back() {
    let dispatcher = online_dispatcher().await;
    let result = dispatcher
        .call_tool("utility_greet", &Persona::default(), json!({}))
        .await
        .unwrap();
    assert!(result.as_str().unwrap().contains("stranger"));
}

#[tokio::test(flavor = "multi_thread")]
async fn listings_are_persona_scoped_and_ordered() {
    let dispatcher = online_dispatcher().await;
    let tools = dispatcher.list_tools(&Persona::default()).await.unwrap();

    // Seeded tools: the general group sorts before system.
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
    assert!(names.contains(&"utility_greet"));
    assert!(names.contains(&"create_new_sql_tool"));
    let greet_pos = names.iter().position(|n| *n == "utility_greet").unwrap();
    let system_pos = names.iter().position(|n| *n == "create_new_sql_tool").unwrap();
    assert!(greet_pos < system_pos, "general group lists before system");

    // An unknown persona sees nothing.
    let other = dispatcher.list_tools(&Persona::new("nobody")).await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn unknown_tools_fail_with_tool_not_found_and_are_audited() {
    let dispatcher = online_dispatcher().await;
    let err = dispatcher
        .call_tool("no_such_tool", &Persona::default(), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        quiver_mcp::DispatchError::ToolNotFound { .. }
    ));

    let entries = dispatcher
        .state()
        .recorder()
        .recent("no_such_tool", 10)
        .await
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, quiver_audit::ExecutionStatus::Failure);
}

#[tokio::test(flavor = "multi_thread")]
async fn cross_persona_calls_are_not_blocked() {
    // Persona scopes listings, not invocation: calling a default-persona
    // tool while "analyst" fails only because resolution is by (name,
    // persona) pair. An explicit default-persona call still works.
    let dispatcher = online_dispatcher().await;
    let err = dispatcher
        .call_tool("utility_greet", &Persona::new("analyst"), json!({}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        quiver_mcp::DispatchError::ToolNotFound { .. }
    ));

    dispatcher
        .call_tool("utility_greet", &Persona::default(), json!({}))
        .await
        .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn seeded_resource_and_prompt_resolve() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    let content = dispatcher
        .read_resource("memo://welcome", &persona)
        .await
        .unwrap();
    assert!(content.body.contains("registry database"));
    assert_eq!(content.mime_type, "text/plain");

    let prompt = dispatcher
        .get_prompt(
            "review_code",
            &persona,
            &json!({"language": "Rust", "code": "fn main() {}"}),
        )
        .await
        .unwrap();
    assert!(prompt.messages[0].content.text.contains("Rust"));

    let err = dispatcher
        .get_prompt("review_code", &persona, &json!({"language": "Rust"}))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        quiver_mcp::DispatchError::MissingArgument { name } if name == "code"
    ));
}
