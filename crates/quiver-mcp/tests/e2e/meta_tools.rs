//! The self-modifying surface: prompts, resources, manuals, merge/DDL.

use serde_json::json;

use quiver_core::Persona;
use quiver_mcp::DispatchError;

use super::common::online_dispatcher;

#[tokio::test(flavor = "multi_thread")]
async fn created_prompts_are_immediately_dispatchable() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    dispatcher
        .call_tool(
            "create_new_prompt",
            &persona,
            json!({
                "name": "summarize",
                "description": "Summarize some text",
                "template": "Summarize the following in {words} words:\n{text}",
                "arguments": [
                    {"name": "words", "description": "Word budget", "required": true},
                    {"name": "text", "description": "Text to summarize", "required": true}
                ]
            }),
        )
        .await
        .unwrap();

    let prompt = dispatcher
        .get_prompt("summarize", &persona, &json!({"words": 10, "text": "..."}))
        .await
        .unwrap();
    assert!(prompt.messages[0].content.text.contains("10 words"));

    let listed = dispatcher.list_prompts(&persona).await.unwrap();
    assert!(listed.iter().any(|p| p.name == "summarize"));
}

#[tokio::test(flavor = "multi_thread")]
async fn created_resources_are_static_and_readable() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    dispatcher
        .call_tool(
            "create_new_resource",
            &persona,
            json!({
                "uri": "memo://notes",
                "name": "Notes",
                "description": "Scratch notes",
                "content": "remember the milk",
                "mime_type": "text/plain"
            }),
        )
        .await
        .unwrap();

    let content = dispatcher.read_resource("memo://notes", &persona).await.unwrap();
    assert_eq!(content.body, "remember the milk");

    // Temp resources shadow nothing and disappear with the process.
    dispatcher
        .call_tool(
            "create_temp_resource",
            &persona,
            json!({
                "uri": "memo://scratch",
                "name": "Scratch",
                "description": "ephemeral",
                "content": "gone at restart"
            }),
        )
        .await
        .unwrap();
    let temp = dispatcher
        .read_resource("memo://scratch", &persona)
        .await
        .unwrap();
    assert_eq!(temp.body, "gone at restart");
}

#[tokio::test(flavor = "multi_thread")]
async fn manual_update_inspect_verify_lifecycle() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    // Merge a new example into the seeded greet manual.
    dispatcher
        .call_tool(
            "system_update_manual",
            &persona,
            json!({
                "tool_name": "utility_greet",
                "mode": "merge",
                "manual": {
                    "examples": [
                        {"input": {"name": "Ada"}, "expect": "Ada"}
                    ],
                    "pitfalls": ["names are not validated"]
                }
            }),
        )
        .await
        .unwrap();

    let inspected = dispatcher
        .call_tool(
            "system_inspect_tool",
            &persona,
            json!({"tool_name": "utility_greet"}),
        )
        .await
        .unwrap();
    let examples = inspected["manual"]["examples"].as_array().unwrap();
    assert_eq!(examples.len(), 2, "seeded example plus the merged one");
    assert!(
        examples.iter().all(|e| e["verified"] == false),
        "updates reset verification"
    );

    // Verification runs every example through the dispatcher.
    let report = dispatcher
        .call_tool(
            "system_verify_tool",
            &persona,
            json!({"tool_name": "utility_greet"}),
        )
        .await
        .unwrap();
    assert_eq!(report["passed"], 2);
    assert_eq!(report["verified"], true);

    let inspected = dispatcher
        .call_tool(
            "system_inspect_tool",
            &persona,
            json!({"tool_name": "utility_greet"}),
        )
        .await
        .unwrap();
    assert!(inspected["manual"]["examples"]
        .as_array()
        .unwrap()
        .iter()
        .all(|e| e["verified"] == true));
}

#[tokio::test(flavor = "multi_thread")]
async fn merge_tool_upserts_by_key() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    // Insert a brand-new row, then overwrite it.
    dispatcher
        .call_tool(
            "general_merge_tool",
            &persona,
            json!({
                "table_name": "sales",
                "key_column": "id",
                "key_value": 99,
                "data": {
                    "business_date": "2024-04-01",
                    "store": "Z",
                    "department": "toys",
                    "amount": 1.0
                }
            }),
        )
        .await
        .unwrap();
    dispatcher
        .call_tool(
            "general_merge_tool",
            &persona,
            json!({
                "table_name": "sales",
                "key_column": "id",
                "key_value": 99,
                "data": {
                    "business_date": "2024-04-01",
                    "store": "Z",
                    "department": "toys",
                    "amount": 2.5
                }
            }),
        )
        .await
        .unwrap();

    dispatcher
        .call_tool(
            "create_temp_tool",
            &persona,
            json!({
                "tool_name": "store_z",
                "description": "store Z rows",
                "sql_query": "SELECT amount FROM sales WHERE store = 'Z'"
            }),
        )
        .await
        .unwrap();
    let rows = dispatcher
        .call_tool("store_z", &persona, json!({}))
        .await
        .unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 1, "merge replaced, not duplicated");
    assert_eq!(rows[0]["amount"], 2.5);
}

#[tokio::test(flavor = "multi_thread")]
async fn ddl_requires_explicit_confirmation() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    let err = dispatcher
        .call_tool(
            "execute_ddl_tool",
            &persona,
            json!({"ddl_command": "CREATE TABLE widgets (id INTEGER)", "confirmation": "yes"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::InvalidInput(_)));

    dispatcher
        .call_tool(
            "execute_ddl_tool",
            &persona,
            json!({"ddl_command": "CREATE TABLE widgets (id INTEGER)", "confirmation": "YES"}),
        )
        .await
        .unwrap();

    // Non-DDL statements are rejected by the DDL validator.
    let err = dispatcher
        .call_tool(
            "execute_ddl_tool",
            &persona,
            json!({"ddl_command": "SELECT 1", "confirmation": "YES"}),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DispatchError::Policy(quiver_policy::PolicyError::NotDdl)
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn notebook_tool_remembers_and_forgets() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    dispatcher
        .call_tool(
            "system_notebook",
            &persona,
            json!({"action": "set", "domain": "user_prefs", "key": "tone", "value": "dry"}),
        )
        .await
        .unwrap();

    let entry = dispatcher
        .call_tool(
            "system_notebook",
            &persona,
            json!({"action": "get", "domain": "user_prefs", "key": "tone"}),
        )
        .await
        .unwrap();
    assert_eq!(entry["value"], "dry");

    dispatcher
        .call_tool(
            "system_notebook",
            &persona,
            json!({"action": "delete", "domain": "user_prefs", "key": "tone"}),
        )
        .await
        .unwrap();
    let listed = dispatcher
        .call_tool(
            "system_notebook",
            &persona,
            json!({"action": "list", "domain": "user_prefs"}),
        )
        .await
        .unwrap();
    assert!(listed.as_array().unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn dashboard_dispatch_returns_the_runner_url() {
    let dispatcher = online_dispatcher().await;
    let persona = Persona::default();

    dispatcher
        .call_tool(
            "create_dashboard",
            &persona,
            json!({
                "tool_name": "sales_board",
                "description": "Sales at a glance",
                "content": "board body"
            }),
        )
        .await
        .unwrap();

    let result = dispatcher
        .call_tool("sales_board", &persona, json!({}))
        .await
        .unwrap();
    let url = result.as_str().unwrap();
    assert!(url.contains("page=sales_board"));
}
